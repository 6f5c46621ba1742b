use std::io::{self, Read};

use anyhow::{Context, Result};
use serde_json::Value;
use tiercache_core::{Cache, CacheContext};

use super::Outcome;
use crate::output::{print_success, print_value, print_warning};

fn parse_value(value: Option<&str>) -> Result<Value> {
    let content = match value {
        Some(raw) => raw.to_string(),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    serde_json::from_str(&content).context("Invalid JSON value")
}

pub async fn get(cache: &dyn Cache<Value>, ctx: &CacheContext, key: &str) -> Result<Outcome> {
    match cache.get(ctx, key).await {
        Ok(value) => {
            print_value(&value);
            Ok(Outcome::Done)
        }
        Err(e) if e.is_miss() => {
            print_warning(&format!("Key not found: {key}"));
            Ok(Outcome::Miss)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to get {key}")),
    }
}

pub async fn set(
    cache: &dyn Cache<Value>,
    ctx: &CacheContext,
    key: &str,
    value: Option<&str>,
) -> Result<Outcome> {
    let value = parse_value(value)?;
    cache
        .set(ctx, key, &value)
        .await
        .with_context(|| format!("Failed to set {key}"))?;
    print_success(&format!("Stored {key}"));
    Ok(Outcome::Done)
}

pub async fn ping(cache: &dyn Cache<Value>, ctx: &CacheContext) -> Result<Outcome> {
    ctx.run(cache.ping()).await.context("Cache is not healthy")?;
    print_success(&format!("{} is healthy", cache.name()));
    Ok(Outcome::Done)
}
