use std::env;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use log::info;

use observe_stream::{Change, KeyValueStore, ObserveExt, ObservingOptions};

/// Observes a single key of a store while another thread edits it, printing each old/new pair.
/// Options default to `old,new` and can be overridden with `OBSERVE_OPTIONS`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options: ObservingOptions = env::var("OBSERVE_OPTIONS")
        .unwrap_or_else(|_| "old,new".to_string())
        .parse()
        .context("invalid OBSERVE_OPTIONS")?;

    let defaults = KeyValueStore::<String>::new();
    let users = defaults.changes("user", options);
    let canceller = users.canceller();

    let editor_defaults = defaults.clone();
    let editor = thread::spawn(move || {
        for name in ["Alice", "Bob", "Charlie"] {
            editor_defaults.set("user", name.to_string());
            thread::sleep(Duration::from_millis(200));
        }
        editor_defaults.remove("user");
        thread::sleep(Duration::from_millis(200));
        canceller.cancel();
    });

    users
        .for_each(|Change { old_value, new_value }| async move {
            info!("user: {old_value:?} -> {new_value:?}");
        })
        .await;

    editor
        .join()
        .map_err(|_| anyhow::anyhow!("editor thread panicked"))?;
    info!("{} keys left in store", defaults.len());
    Ok(())
}
