use anyhow::{bail, Context, Result};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

const LOCK_TTL_MS: u64 = 30_000;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const ACQUIRE_POLL: Duration = Duration::from_millis(100);

/// Compare-and-delete so a guard never releases a lock a later holder took
/// over after TTL expiry.
const RELEASE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// Serializes all work on one (user, profession) attempt. Single-process
/// deployments and tests use the local variant; multi-replica deployments
/// take an advisory lock in Redis.
#[derive(Clone)]
pub enum AttemptLocks {
    Local(Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>),
    Redis(ConnectionManager),
}

impl AttemptLocks {
    pub fn local() -> Self {
        AttemptLocks::Local(Arc::new(Mutex::new(HashMap::new())))
    }

    pub fn redis(conn: ConnectionManager) -> Self {
        AttemptLocks::Redis(conn)
    }

    pub async fn acquire(&self, user_id: &str, profession_id: &str) -> Result<AttemptLockGuard> {
        let key = format!("attempt_lock:{}:{}", user_id, profession_id);
        match self {
            AttemptLocks::Local(map) => {
                let entry = {
                    let mut map = map.lock().expect("lock table poisoned");
                    map.entry(key).or_default().clone()
                };
                let guard = tokio::time::timeout(ACQUIRE_TIMEOUT, entry.lock_owned())
                    .await
                    .context("Timed out waiting for the attempt lock")?;
                Ok(AttemptLockGuard::Local(guard))
            }
            AttemptLocks::Redis(conn) => {
                let token = Uuid::new_v4().to_string();
                let deadline = tokio::time::Instant::now() + ACQUIRE_TIMEOUT;
                let mut conn = conn.clone();
                loop {
                    let acquired: bool = redis::cmd("SET")
                        .arg(&key)
                        .arg(&token)
                        .arg("NX")
                        .arg("PX")
                        .arg(LOCK_TTL_MS)
                        .query_async(&mut conn)
                        .await
                        .context("Failed to take the attempt lock")?;
                    if acquired {
                        return Ok(AttemptLockGuard::Redis {
                            conn,
                            key,
                            token,
                        });
                    }
                    if tokio::time::Instant::now() >= deadline {
                        bail!("Timed out waiting for the attempt lock");
                    }
                    tokio::time::sleep(ACQUIRE_POLL).await;
                }
            }
        }
    }
}

pub enum AttemptLockGuard {
    Local(OwnedMutexGuard<()>),
    Redis {
        conn: ConnectionManager,
        key: String,
        token: String,
    },
}

impl Drop for AttemptLockGuard {
    fn drop(&mut self) {
        if let AttemptLockGuard::Redis { conn, key, token } = self {
            let mut conn = conn.clone();
            let key = std::mem::take(key);
            let token = std::mem::take(token);
            tokio::spawn(async move {
                let released: Result<i32, _> = redis::Script::new(RELEASE_SCRIPT)
                    .key(&key)
                    .arg(&token)
                    .invoke_async(&mut conn)
                    .await;
                if let Err(e) = released {
                    tracing::warn!("Failed to release attempt lock {}: {}", key, e);
                }
            });
        }
    }
}
