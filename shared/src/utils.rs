use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::debug;

pub const RETRY_TIMES: u32 = 5;
pub const RETRY_DELAY: u64 = 300;

pub const TOKEN_DECIMALS: u32 = 9;

/// run `retry_fn` until it succeeds or `max_retries` extra attempts were spent
pub async fn retry<T, E, F, Fut>(retry_fn: F, max_retries: u32, delay: u64) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    F: Fn() -> Fut,
    E: std::fmt::Debug, {
    let mut retries = 0;
    let d = Duration::from_millis(delay);
    loop {
        match retry_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if retries < max_retries => {
                retries += 1;
                debug!("retry {retries}/{max_retries}: {err:?}");
                sleep(d).await;
            }
            Err(err) => {
                return Err(err);
            }
        }
    }
}

/// base units to a decimal string, `1_500_000_000` -> `1.5`
pub fn format_amount(amount: u64, decimals: u32) -> String {
    let unit = 10u64.pow(decimals);
    let whole = amount / unit;
    let frac = amount % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

pub fn format_hashrate(hashrate: f64) -> String {
    if hashrate >= 1_000_000.0 {
        format!("{:.2} MH/s", hashrate / 1_000_000.0)
    } else if hashrate >= 1_000.0 {
        format!("{:.2} KH/s", hashrate / 1_000.0)
    } else {
        format!("{:.2} H/s", hashrate)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn amount_formatting() {
        assert_eq!(format_amount(0, TOKEN_DECIMALS), "0");
        assert_eq!(format_amount(1_500_000_000, TOKEN_DECIMALS), "1.5");
        assert_eq!(format_amount(100_000_000, TOKEN_DECIMALS), "0.1");
        assert_eq!(format_amount(2_000_000_001, TOKEN_DECIMALS), "2.000000001");
    }

    #[test]
    fn hashrate_units() {
        assert_eq!(format_hashrate(12.0), "12.00 H/s");
        assert_eq!(format_hashrate(2_500.0), "2.50 KH/s");
        assert_eq!(format_hashrate(3_000_000.0), "3.00 MH/s");
    }

    #[tokio::test]
    async fn retry_until_success() {
        let calls = AtomicU32::new(0);
        let res: Result<u32, String> = retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(n)
                }
            },
            RETRY_TIMES,
            1,
        )
        .await;
        assert_eq!(res, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up() {
        let calls = AtomicU32::new(0);
        let res: Result<(), &str> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down")
            },
            2,
            1,
        )
        .await;
        assert_eq!(res, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
