//! `ambit order`: start one computation per delay and print outcomes in the
//! order the handles are issued.

use std::time::{Duration, Instant};

use ambit::{DeliveryOrder, OrderedTasks};
use anyhow::{Result, anyhow};

pub async fn run(delays_ms: &[u64], completion: bool) -> Result<()> {
    let order = if completion { DeliveryOrder::Completion } else { DeliveryOrder::Submission };
    let started = Instant::now();

    let tasks = OrderedTasks::spawn_all_with_order(
        delays_ms.iter().copied().enumerate().map(|(index, ms)| {
            move || async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                log::debug!("computation {} finished after {}ms", index, ms);
                (index, ms)
            }
        }),
        order,
    )?;
    println!("{} computations, {:?} order", tasks.len(), tasks.order());

    for handle in tasks {
        let slot = handle.ordinal();
        let (index, ms) = handle.await.map_err(|e| anyhow!("slot {}: {}", slot, e))?;
        println!(
            "slot {:>3}  computation {:>3}  delay {:>5}ms  at {:>5}ms",
            slot,
            index,
            ms,
            started.elapsed().as_millis()
        );
    }
    Ok(())
}
