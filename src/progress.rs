//! Text progress indicator for a training epoch

use indicatif::ProgressStyle;

const TEMPLATE: &str = "{bar:40.cyan/blue} {pos:>4}/{len:4} [{elapsed_precise}] {msg}";

/// Tracks progress through the batches of one epoch. Draws nothing when hidden.
pub struct ProgressBar {
    inner: indicatif::ProgressBar,
}

impl ProgressBar {
    pub fn new(n_batches: usize, visible: bool) -> Self {
        if !visible {
            return Self {
                inner: indicatif::ProgressBar::hidden(),
            };
        }
        let inner = indicatif::ProgressBar::new(n_batches as u64);
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        inner.set_style(style);
        Self { inner }
    }

    /// Prints `Epoch {epoch + 1} / {epochs}` above the bar
    pub fn epoch_header(&self, epoch: usize, epochs: usize) {
        self.inner.println(format!("Epoch {} / {}", epoch + 1, epochs));
    }

    /// Marks batch `batch_index` as done and shows `message` next to the bar
    pub fn bar(&self, batch_index: usize, message: String) {
        self.inner.set_position(batch_index as u64 + 1);
        self.inner.set_message(message);
    }

    /// Completes the bar, leaving `message` as the final line
    pub fn close(&self, message: String) {
        if let Some(len) = self.inner.length() {
            self.inner.set_position(len);
        }
        self.inner.finish_with_message(message);
    }

    /// Number of batches marked as done
    pub fn position(&self) -> u64 {
        self.inner.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bar_tracks_position() {
        let pb = ProgressBar::new(4, false);
        pb.epoch_header(0, 2);
        pb.bar(1, "train_loss: 0.5000".to_string());
        assert_eq!(pb.position(), 2);
        pb.close("train_loss: 0.2500".to_string());
    }

    #[test]
    fn test_visible_bar_closes_at_end() {
        let pb = ProgressBar::new(3, true);
        pb.bar(0, String::new());
        pb.close(String::new());
        assert_eq!(pb.position(), 3);
    }
}
