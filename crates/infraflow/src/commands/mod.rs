pub mod build;
pub mod check;
pub mod destroy;
pub mod kubeconfig;
pub mod outputs;
pub mod preview;
pub mod refresh;
pub mod render;
pub mod up;
