//! Demonstration of plumbing-rs channels and pipelines.
//!
//! Run with: `cargo run -p plumbing-rs --bin demo`
//! Stage lifecycle logs: `RUST_LOG=plumbing_rs=debug cargo run -p plumbing-rs --bin demo`

use anyhow::{anyhow, Result};
use plumbing_rs::{sink, Channel, Config, FailurePolicy, Pipeline};
use std::thread::{self, JoinHandle};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    println!("=== plumbing-rs Demo ===\n");

    let words: Vec<String> = ["Hello", "Concurrent", "World", "Of"]
        .iter()
        .map(ToString::to_string)
        .collect();

    demo_channel(&words)?;
    demo_splitting()?;
    demo_connect(words)?;
    demo_failure_policies()?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

fn join<T>(handle: JoinHandle<T>) -> Result<T> {
    handle.join().map_err(|_| anyhow!("demo thread panicked"))
}

/// Demo 1: one writer thread, one reader thread, a late value, then close
fn demo_channel(words: &[String]) -> Result<()> {
    println!("--- Demo 1: Channel ---");

    let channel = Channel::new(4)?;

    let writer = {
        let channel = channel.clone();
        let words = words.to_vec();
        thread::spawn(move || -> Result<()> {
            for word in words {
                channel.push(word)?;
            }
            Ok(())
        })
    };

    let reader = {
        let outlet = channel.outlet();
        thread::spawn(move || {
            for word in outlet {
                println!("  {word}");
            }
        })
    };

    join(writer)??;
    channel.push("Awesomeness".to_string())?;
    channel.close()?;
    join(reader)?;

    println!("  metrics: {:?}\n", channel.metrics());
    Ok(())
}

/// Demo 2: two readers competing for the values of one channel
fn demo_splitting() -> Result<()> {
    println!("--- Demo 2: Two Readers ---");

    let channel = Channel::new(4)?;
    let readers: Vec<_> = ["A", "B"]
        .into_iter()
        .map(|name| {
            let channel = channel.clone();
            thread::spawn(move || {
                while let Some(value) = channel.pop() {
                    println!("  Thread {name}: {value}");
                }
            })
        })
        .collect();

    for value in 1..=10 {
        channel.push(value)?;
    }
    channel.close()?;

    for reader in readers {
        join(reader)?;
    }
    println!();
    Ok(())
}

/// Demo 3: a two-stage pipeline ending in a terminal stage
fn demo_connect(words: Vec<String>) -> Result<()> {
    println!("--- Demo 3: Connect ---");

    let first_char = |s: String| s.chars().next().unwrap_or(' ');
    let print_line = |c: char| println!("  {c}");

    (Pipeline::from_source(words) >> first_char >> sink(print_line)).wait()?;
    println!();
    Ok(())
}

/// Demo 4: a failing stage under both failure policies
fn demo_failure_policies() -> Result<()> {
    println!("--- Demo 4: Failure Policies ---");

    let parse = |s: &str| s.parse::<u32>();
    let input = ["1", "2", "three", "4"];

    let config = Config::default().with_failure_policy(FailurePolicy::Propagate);
    for item in Pipeline::with_config(input, config)?.try_then(parse) {
        match item {
            Ok(n) => println!("  parsed {n}"),
            Err(error) => println!("  skipped: {error}"),
        }
    }

    match Pipeline::from_source(input).try_then(parse).wait() {
        Ok(()) => println!("  abort-all: completed"),
        Err(error) => println!("  abort-all: {error}"),
    }
    Ok(())
}
