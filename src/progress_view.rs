//! Progress UI: one spinner line per blog being crawled.

use std::collections::HashMap;
use std::time::Duration;

use blogcrawl_core::ProgressUpdate;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Renders updates until every sender is dropped.
///
/// When `enabled` is false updates are drained without drawing anything.
pub(crate) fn spawn_progress_view(
    enabled: bool,
    mut updates: UnboundedReceiver<ProgressUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !enabled {
            while updates.recv().await.is_some() {}
            return;
        }

        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{spinner} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let mut bars: HashMap<String, ProgressBar> = HashMap::new();

        while let Some(update) = updates.recv().await {
            if update.is_finished() {
                if let Some(bar) = bars.remove(&update.blog) {
                    bar.finish_and_clear();
                }
                let line = match &update.error {
                    Some(error) => format!("{} failed: {error}", update.blog),
                    None => format!("{} done", update.blog),
                };
                let _ = multi.println(line);
                continue;
            }

            let bar = bars.entry(update.blog.clone()).or_insert_with(|| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(update.blog.clone());
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            });
            bar.set_message(render(&update));
        }

        for bar in bars.into_values() {
            bar.finish_and_clear();
        }
    })
}

fn render(update: &ProgressUpdate) -> String {
    if update.last_item_label.is_empty() {
        update.percentage_text.clone()
    } else {
        format!("{} {}", update.percentage_text, update.last_item_label)
    }
}
