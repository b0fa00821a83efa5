use crate::keys::ContentType;

/// Current usage figures needed to evaluate admission. Usage accounting
/// itself lives in the relational store; the object store only judges a
/// snapshot handed to it by the caller (kept decoupled from the DB schema).
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageSnapshot {
    pub bucket_total_bytes: u64,
    pub tenant_total_bytes: u64,
    pub tenant_content_type_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub bucket_total_gb: f64,
    pub bucket_emergency_gb: f64,
    pub per_tenant_gb: f64,
    pub media_gb: f64,
    pub vision_gb: f64,
    pub crawl_gb: f64,
    pub max_object_media_mb: f64,
    pub max_object_vision_mb: f64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            bucket_total_gb: 15.0,
            bucket_emergency_gb: 14.0,
            per_tenant_gb: 2.0,
            media_gb: 10.0,
            vision_gb: 2.0,
            crawl_gb: 2.0,
            max_object_media_mb: 15.0,
            max_object_vision_mb: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub current_usage_gb: f64,
    pub tenant_limit_gb: f64,
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Pre-upload admission check (C3 `CheckQuota`). A denial is an observable
/// outcome the caller branches on, never an exception.
pub fn check_quota(
    usage: UsageSnapshot,
    limits: &QuotaLimits,
    size_bytes: u64,
    content_type: ContentType,
) -> QuotaDecision {
    let tenant_gb = usage.tenant_total_bytes as f64 / GIB;
    let deny = |reason: &str| QuotaDecision {
        allowed: false,
        reason: Some(reason.to_string()),
        current_usage_gb: tenant_gb,
        tenant_limit_gb: limits.per_tenant_gb,
    };

    let max_object_mb = match content_type {
        ContentType::Media => limits.max_object_media_mb,
        ContentType::Vision => limits.max_object_vision_mb,
        ContentType::Crawl => limits.max_object_vision_mb,
        ContentType::Album => limits.max_object_vision_mb,
    };
    if size_bytes as f64 / MIB > max_object_mb {
        return deny("object_too_large");
    }

    if (usage.bucket_total_bytes + size_bytes) as f64 / GIB > limits.bucket_total_gb {
        return deny("bucket_total");
    }

    if (usage.tenant_total_bytes + size_bytes) as f64 / GIB > limits.per_tenant_gb {
        return deny("tenant_limit");
    }

    let content_type_cap_gb = match content_type {
        ContentType::Media => limits.media_gb,
        ContentType::Vision => limits.vision_gb,
        ContentType::Crawl => limits.crawl_gb,
        ContentType::Album => f64::INFINITY,
    };
    if (usage.tenant_content_type_bytes + size_bytes) as f64 / GIB > content_type_cap_gb {
        return deny("content_type_limit");
    }

    QuotaDecision {
        allowed: true,
        reason: None,
        current_usage_gb: tenant_gb,
        tenant_limit_gb: limits.per_tenant_gb,
    }
}

/// True when the bucket has crossed the eviction trigger (§4.3 emergency
/// threshold), independent of any single tenant's allocation.
pub fn over_emergency_threshold(usage: UsageSnapshot, limits: &QuotaLimits) -> bool {
    usage.bucket_total_bytes as f64 / GIB >= limits.bucket_emergency_gb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_when_tenant_cap_would_be_exceeded() {
        let usage = UsageSnapshot {
            bucket_total_bytes: 0,
            tenant_total_bytes: (1.98 * GIB) as u64,
            tenant_content_type_bytes: 0,
        };
        let limits = QuotaLimits::default();
        let decision = check_quota(usage, &limits, 50 * 1024 * 1024, ContentType::Vision);
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("tenant_limit"));
    }

    #[test]
    fn allows_when_within_all_caps() {
        let usage = UsageSnapshot::default();
        let limits = QuotaLimits::default();
        let decision = check_quota(usage, &limits, 1024, ContentType::Media);
        assert!(decision.allowed);
    }

    #[test]
    fn emergency_threshold_trips_at_configured_gb() {
        let limits = QuotaLimits::default();
        let usage = UsageSnapshot {
            bucket_total_bytes: (14.5 * GIB) as u64,
            ..Default::default()
        };
        assert!(over_emergency_threshold(usage, &limits));
    }
}
