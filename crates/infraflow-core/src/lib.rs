//! infraflow core
//!
//! スタック定義（infra.kdl）の発見・テンプレート展開・パースを行い、
//! 型付きの [`StackConfig`] を生成します。

pub mod discovery;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;

pub use discovery::{DiscoveredFiles, discover_files, find_project_root};
pub use error::{InfraError, Result};
pub use loader::{load_project, load_project_from_root};
pub use model::*;
pub use parser::{apply_kdl_string, parse_kdl_file, parse_kdl_string};
