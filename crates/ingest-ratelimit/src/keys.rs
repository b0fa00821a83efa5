//! Typed KV keyspaces (§6 persisted-state key families), so TTLs and shapes
//! are enforced in one place instead of scattered raw string formatting.

pub fn floodwait_key(account_id: &str, method: &str) -> String {
    format!("floodwait:{account_id}:{method}")
}

pub fn cooldown_key(channel_id: &str) -> String {
    format!("channel:cooldown:{channel_id}")
}

#[derive(Debug, Clone, Copy)]
pub enum RateScope {
    User,
    Channel,
    Global,
}

impl RateScope {
    fn label(self) -> &'static str {
        match self {
            RateScope::User => "user",
            RateScope::Channel => "channel",
            RateScope::Global => "global",
        }
    }
}

pub fn rate_limit_key(scope: RateScope, id: &str, minute_bucket: i64) -> String {
    format!("rate_limit:{}:{id}:{minute_bucket}", scope.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_as_specified() {
        assert_eq!(floodwait_key("acc1", "get_messages"), "floodwait:acc1:get_messages");
        assert_eq!(cooldown_key("c1"), "channel:cooldown:c1");
        assert_eq!(rate_limit_key(RateScope::User, "u1", 12345), "rate_limit:user:u1:12345");
    }
}
