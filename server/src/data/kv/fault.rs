//! Fault injection for the KV client
//!
//! Lets operators and tests force specific KV operations to fail so the
//! in-process fallbacks can be exercised against a healthy backend.
//!
//! Accepted values (comma separated, case insensitive):
//! - `connect` or `all`: every operation fails
//! - `get`, `set`, `mget`, `eval`, `ping`: only the named operations fail
//!
//! `incr` is implemented as a script and is covered by `eval`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A single class of KV operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvOp {
    Connect,
    Get,
    Set,
    Mget,
    Eval,
    Ping,
}

impl KvOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Get => "get",
            Self::Set => "set",
            Self::Mget => "mget",
            Self::Eval => "eval",
            Self::Ping => "ping",
        }
    }
}

impl fmt::Display for KvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of operations forced to fail
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultInjection {
    all: bool,
    ops: HashSet<KvOp>,
}

impl FaultInjection {
    /// No injected faults
    pub fn none() -> Self {
        Self::default()
    }

    /// Every operation fails, as if the backend were unreachable
    pub fn all() -> Self {
        Self {
            all: true,
            ops: HashSet::new(),
        }
    }

    /// Only the given operations fail
    pub fn ops(ops: impl IntoIterator<Item = KvOp>) -> Self {
        let ops: HashSet<KvOp> = ops.into_iter().collect();
        Self {
            all: ops.contains(&KvOp::Connect),
            ops,
        }
    }

    pub fn is_active(&self) -> bool {
        self.all || !self.ops.is_empty()
    }

    /// Whether `op` must fail
    pub fn fails(&self, op: KvOp) -> bool {
        self.all || self.ops.contains(&op)
    }
}

impl FromStr for FaultInjection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ops = HashSet::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let op = match token.to_lowercase().as_str() {
                "none" | "off" => continue,
                "all" | "connect" => KvOp::Connect,
                "get" => KvOp::Get,
                "set" => KvOp::Set,
                "mget" => KvOp::Mget,
                "eval" | "incr" => KvOp::Eval,
                "ping" => KvOp::Ping,
                other => {
                    return Err(format!(
                        "Invalid KV fault '{}'. Valid options: connect, all, get, set, mget, eval, ping",
                        other
                    ));
                }
            };
            ops.insert(op);
        }
        Ok(Self::ops(ops))
    }
}

impl fmt::Display for FaultInjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all {
            return f.write_str("all");
        }
        if self.ops.is_empty() {
            return f.write_str("none");
        }
        let mut names: Vec<&str> = self.ops.iter().map(KvOp::as_str).collect();
        names.sort_unstable();
        f.write_str(&names.join(","))
    }
}
