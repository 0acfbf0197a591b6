use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use imgcache_engine::Resolution;
use std::time::Duration;

fn download_style() -> Option<ProgressStyle> {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}")
        .ok()
        .map(|style| style.progress_chars("=> "))
}

/// One progress bar per resolved URI, fed from controller resolutions
pub struct ProgressManager {
    multi: MultiProgress,
    bar: Option<ProgressBar>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bar: None,
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            bar: None,
            disabled: true,
        }
    }

    pub fn handle_resolution(&mut self, uri: &str, resolution: &Resolution) {
        if self.disabled {
            return;
        }

        match resolution {
            Resolution::Pending { .. } => {
                self.finish(None);
                let bar = self.multi.add(ProgressBar::new(0));
                if let Some(style) = download_style() {
                    bar.set_style(style);
                }
                bar.set_message(format!("Downloading {uri}"));
                bar.enable_steady_tick(Duration::from_millis(200));
                self.bar = Some(bar);
            }
            Resolution::Downloading {
                bytes_written,
                content_length,
                ..
            } => {
                if let Some(bar) = &self.bar {
                    if let Some(total) = content_length {
                        bar.set_length(*total);
                    }
                    bar.set_position(*bytes_written);
                }
            }
            Resolution::Resolved(_) => self.finish(Some(format!("Cached {uri}"))),
            Resolution::Uncacheable(reason) => self.finish(Some(format!("Failed {uri}: {reason}"))),
            Resolution::Idle | Resolution::Deferred => self.finish(None),
        }
    }

    fn finish(&mut self, message: Option<String>) {
        let Some(bar) = self.bar.take() else {
            return;
        };
        match message {
            Some(message) => bar.finish_with_message(message),
            None => bar.finish_and_clear(),
        }
    }
}
