//! `snmp2`-backed SNMPv2c implementation of [`SnmpTransport`].
//!
//! One UDP session is shared behind an async mutex; every request is bounded
//! by the configured timeout and retried up to the configured retry count
//! before the error is surfaced to the caller.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use snmp2::{AsyncSession, Oid, Value};
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{SnmpTransport, SnmpValue, TransportError};

/// Connection parameters for one SNMP agent.
#[derive(Debug, Clone)]
pub struct SnmpTarget {
    pub host: String,
    pub port: u16,
    pub community: String,
    pub timeout: Duration,
    pub retries: u32,
    pub max_repetitions: u32,
}

pub struct SnmpV2cTransport {
    session: Mutex<AsyncSession>,
    target: SnmpTarget,
}

impl SnmpV2cTransport {
    /// Opens a v2c session against the target. The socket is bound eagerly so
    /// misconfigured addresses fail at startup, not on the first poll.
    pub async fn connect(target: SnmpTarget) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", target.host, target.port);
        let session = AsyncSession::new_v2c(&addr, target.community.as_bytes(), 0)
            .await
            .map_err(|e| TransportError::Session(format!("connect to {addr}: {e:?}")))?;
        debug!("SNMP session established to {addr}");
        Ok(Self {
            session: Mutex::new(session),
            target,
        })
    }

    fn parse_oid(s: &str) -> Result<Oid<'static>, TransportError> {
        let parts: Result<Vec<u64>, _> = s
            .trim()
            .split('.')
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<u64>())
            .collect();
        let parts = parts.map_err(|_| TransportError::Malformed(format!("invalid OID {s}")))?;
        Oid::from(&parts).map_err(|e| TransportError::Malformed(format!("invalid OID {s}: {e:?}")))
    }

    fn convert(value: &Value<'_>) -> SnmpValue {
        match value {
            Value::Integer(n) => SnmpValue::Integer(*n),
            Value::Counter32(n) | Value::Unsigned32(n) | Value::Timeticks(n) => {
                SnmpValue::Counter(u64::from(*n))
            }
            Value::Counter64(n) => SnmpValue::Counter(*n),
            Value::OctetString(bytes) => {
                SnmpValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
            Value::Boolean(b) => SnmpValue::Integer(i64::from(*b)),
            Value::Null | Value::EndOfMibView | Value::NoSuchObject | Value::NoSuchInstance => {
                SnmpValue::Null
            }
            other => SnmpValue::Text(format!("{other:?}")),
        }
    }

    async fn get_once(&self, oid: &Oid<'static>) -> Result<SnmpValue, TransportError> {
        let mut session = self.session.lock().await;
        let resp = timeout(self.target.timeout, session.get(oid))
            .await
            .map_err(|_| TransportError::Timeout(self.target.timeout))?
            .map_err(|e| TransportError::Session(format!("GET failed: {e:?}")))?;
        let (_, value) = resp
            .varbinds
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Malformed("empty GET response".to_string()))?;
        Ok(Self::convert(&value))
    }

    /// One GETBULK page loop, terminated once an OID leaves the base subtree.
    async fn walk_once(
        &self,
        base: &Oid<'static>,
    ) -> Result<Vec<(String, SnmpValue)>, TransportError> {
        let mut results: Vec<(String, SnmpValue)> = Vec::new();
        let mut current = base.to_owned();
        let mut session = self.session.lock().await;

        loop {
            let resp = timeout(
                self.target.timeout,
                session.getbulk(&[&current], 0, self.target.max_repetitions),
            )
            .await
            .map_err(|_| TransportError::Timeout(self.target.timeout))?
            .map_err(|e| TransportError::Session(format!("GETBULK failed: {e:?}")))?;

            let mut advanced = false;
            for (oid, value) in resp.varbinds {
                if !oid.starts_with(base) || matches!(value, Value::EndOfMibView) {
                    return Ok(results);
                }
                results.push((oid.to_string(), Self::convert(&value)));
                current = oid.to_owned();
                advanced = true;
            }

            // An empty page means the agent has nothing further to say.
            if !advanced {
                return Ok(results);
            }
        }
    }

    async fn set_once(&self, varbinds: &[(String, SnmpValue)]) -> Result<(), TransportError> {
        let oids: Vec<Oid<'static>> = varbinds
            .iter()
            .map(|(oid, _)| Self::parse_oid(oid))
            .collect::<Result<_, _>>()?;
        let payloads: Vec<Option<Vec<u8>>> = varbinds
            .iter()
            .map(|(_, v)| match v {
                SnmpValue::Text(s) => Some(s.clone().into_bytes()),
                _ => None,
            })
            .collect();
        let binds: Vec<(&Oid<'_>, Value<'_>)> = varbinds
            .iter()
            .enumerate()
            .map(|(i, (_, v))| {
                let value = match v {
                    SnmpValue::Integer(n) => Value::Integer(*n),
                    SnmpValue::Counter(n) => Value::Counter64(*n),
                    SnmpValue::Text(_) => {
                        Value::OctetString(payloads[i].as_deref().unwrap_or_default())
                    }
                    SnmpValue::Null => Value::Null,
                };
                (&oids[i], value)
            })
            .collect();

        let mut session = self.session.lock().await;
        timeout(self.target.timeout, session.set(&binds))
            .await
            .map_err(|_| TransportError::Timeout(self.target.timeout))?
            .map_err(|e| TransportError::Session(format!("SET failed: {e:?}")))?;
        Ok(())
    }
}

#[async_trait]
impl SnmpTransport for SnmpV2cTransport {
    async fn get(&self, oid: &str) -> Result<SnmpValue, TransportError> {
        let parsed = Self::parse_oid(oid)?;
        let mut last_err = None;
        for attempt in 0..=self.target.retries {
            match self.get_once(&parsed).await {
                Ok(value) => {
                    trace!("GET {oid} -> {value} (attempt {})", attempt + 1);
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        "GET {oid} attempt {}/{} failed: {e}",
                        attempt + 1,
                        self.target.retries + 1
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::Session("no attempts made".to_string())))
    }

    async fn walk(&self, base_oid: &str) -> Result<Vec<(String, SnmpValue)>, TransportError> {
        let base = Self::parse_oid(base_oid)?;
        let mut last_err = None;
        for attempt in 0..=self.target.retries {
            match self.walk_once(&base).await {
                Ok(rows) => {
                    trace!(
                        "walk {base_oid} -> {} rows (attempt {})",
                        rows.len(),
                        attempt + 1
                    );
                    return Ok(rows);
                }
                Err(e) => {
                    warn!(
                        "walk {base_oid} attempt {}/{} failed: {e}",
                        attempt + 1,
                        self.target.retries + 1
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::Session("no attempts made".to_string())))
    }

    async fn set(&self, varbinds: &[(String, SnmpValue)]) -> Result<(), TransportError> {
        let mut last_err = None;
        for attempt in 0..=self.target.retries {
            match self.set_once(varbinds).await {
                Ok(()) => {
                    trace!("SET {} varbinds ok (attempt {})", varbinds.len(), attempt + 1);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "SET attempt {}/{} failed: {e}",
                        attempt + 1,
                        self.target.retries + 1
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| TransportError::Session("no attempts made".to_string())))
    }
}
