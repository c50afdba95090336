//! `ambit track`: originate a call chain, then report it from concurrent and
//! nested tasks.

use std::collections::BTreeMap;

use ambit::ambient;
use ambit::{OrderedTasks, TrackingContext};
use anyhow::{Context, Result, anyhow};

fn parse_headers(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("header `{}` is not KEY=VALUE", entry))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn describe(context: &TrackingContext) -> String {
    format!(
        "chain {} since {} headers {:?}",
        context.call_chain_id(),
        context.originator_utc_display(),
        context.extra_headers()
    )
}

pub async fn run(raw_headers: &[String], task_count: usize) -> Result<()> {
    let headers = parse_headers(raw_headers)?;

    ambient::Snapshot::empty()
        .scope(async move {
            let origin = TrackingContext::new_current_with(headers)?;
            println!("origin   {}", describe(&origin));

            let tasks = OrderedTasks::spawn_all((0..task_count).map(|_| {
                || async {
                    let direct = TrackingContext::current()?;
                    let nested = ambient::spawn_blocking(TrackingContext::current).await??;
                    Ok::<_, anyhow::Error>((direct, nested))
                }
            }))?;

            for handle in tasks {
                let slot = handle.ordinal();
                let (direct, nested) = handle.await.map_err(|e| anyhow!("task {}: {}", slot, e))??;
                let direct = direct.with_context(|| format!("task {} saw no context", slot))?;
                let nested = nested.with_context(|| format!("task {} nested work saw no context", slot))?;
                anyhow::ensure!(
                    direct == origin && nested == origin,
                    "task {} saw a different context",
                    slot
                );
                println!("task {:>3} {}", slot, describe(&direct));
            }

            let wire = origin.serialize()?;
            let restored = TrackingContext::deserialize(&wire)?;
            anyhow::ensure!(restored == origin, "context changed across serialization");
            println!("serialized {} bytes, round trip intact", wire.len());
            Ok::<_, anyhow::Error>(())
        })
        .await
}
