//! `ambit fork`: every node of a task tree writes its own path into the
//! ambient store and checks it still reads that path after its children ran.

use std::future::Future;
use std::pin::Pin;

use ambit::ambient::{self, AmbientValue};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TreePath(Vec<usize>);

impl AmbientValue for TreePath {}

#[derive(Debug, Default)]
struct Tally {
    nodes: usize,
    mismatches: usize,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.nodes += other.nodes;
        self.mismatches += other.mismatches;
    }
}

fn visit(path: Vec<usize>, width: usize, depth: usize) -> Pin<Box<dyn Future<Output = Result<Tally>> + Send>> {
    Box::pin(async move {
        ambient::set(&TreePath(path.clone()))?;
        let mut tally = Tally { nodes: 1, mismatches: 0 };

        if depth > 0 {
            let children: Vec<_> = (0..width)
                .map(|index| {
                    let mut child = path.clone();
                    child.push(index);
                    ambient::spawn(visit(child, width, depth - 1))
                })
                .collect();
            for child in children {
                tally.add(child.await??);
            }
        }

        let seen = ambient::get::<TreePath>()?;
        if seen.as_ref() != Some(&TreePath(path.clone())) {
            log::warn!("node {:?} read {:?}", path, seen);
            tally.mismatches += 1;
        }
        Ok::<_, anyhow::Error>(tally)
    })
}

pub async fn run(width: usize, depth: usize) -> Result<()> {
    let tally = ambient::Snapshot::empty().scope(visit(Vec::new(), width, depth)).await?;
    println!("visited {} nodes (width {}, depth {})", tally.nodes, width, depth);
    if tally.mismatches > 0 {
        bail!("{} nodes saw another branch's path", tally.mismatches);
    }
    println!("every node saw only its own path");
    Ok(())
}
