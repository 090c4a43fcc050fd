use indicatif::{ProgressBar, ProgressStyle};

pub struct BuildProgress {
    progress_bar: ProgressBar,
}

impl BuildProgress {
    pub fn new(image_name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("Building {}...", image_name));

        Self { progress_bar: pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.progress_bar.set_message(msg.to_string());
    }

    pub fn finish_success(&self) {
        self.progress_bar.finish_with_message("Build completed ✓");
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar
            .finish_with_message(format!("Build failed: {}", error));
    }
}
