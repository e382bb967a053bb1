//! Layer 1: fast keyword and regex rules
//!
//! TigerStyle: Readers match against an immutable snapshot; a reload builds a
//! complete new [`RuleSet`] and swaps it in one step.

use async_trait::async_trait;
use medway_core::io::TimeProvider;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

use crate::error::DecisionResult;

/// Default delay between rule reloads
pub const RULE_RELOAD_INTERVAL_MS_DEFAULT: u64 = 60 * 1000;

/// How a rule pattern is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// `|`-separated keywords, any one contained in the input
    Keyword,
    Regex,
}

/// A stored fast-match rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastRule {
    pub id: i64,
    pub match_type: MatchType,
    pub pattern: String,
    /// JSON object; only `max_len` is understood
    #[serde(default)]
    pub condition_param: String,
    #[serde(default)]
    pub action_type: String,
    pub action_content: String,
    #[serde(default)]
    pub priority: i32,
}

impl FastRule {
    pub fn keyword(id: i64, pattern: &str, priority: i32, content: &str) -> Self {
        Self {
            id,
            match_type: MatchType::Keyword,
            pattern: pattern.to_string(),
            condition_param: String::new(),
            action_type: "reply".to_string(),
            action_content: content.to_string(),
            priority,
        }
    }

    pub fn regex(id: i64, pattern: &str, priority: i32, content: &str) -> Self {
        Self {
            match_type: MatchType::Regex,
            ..Self::keyword(id, pattern, priority, content)
        }
    }

    pub fn with_condition(mut self, condition_param: &str) -> Self {
        self.condition_param = condition_param.to_string();
        self
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Keywords(Vec<String>),
    Regex(Regex),
}

/// A rule prepared for matching
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: FastRule,
    matcher: Matcher,
    /// Input length limit in codepoints, 0 for none
    pub max_len: usize,
}

impl CompiledRule {
    /// Prepare a rule; `None` when its regex does not compile
    pub fn compile(rule: FastRule) -> Option<Self> {
        let matcher = match rule.match_type {
            MatchType::Regex => match Regex::new(&rule.pattern) {
                Ok(re) => Matcher::Regex(re),
                Err(e) => {
                    tracing::warn!(rule_id = rule.id, error = %e, "Fast rule regex rejected, skipping");
                    return None;
                }
            },
            MatchType::Keyword => Matcher::Keywords(
                rule.pattern
                    .split('|')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect(),
            ),
        };
        let max_len = parse_max_len(&rule.condition_param);
        Some(Self {
            rule,
            matcher,
            max_len,
        })
    }

    fn matches(&self, input: &str, input_len: usize) -> bool {
        if self.max_len > 0 && input_len > self.max_len {
            return false;
        }
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(input),
            Matcher::Keywords(keywords) => keywords.iter().any(|k| input.contains(k.as_str())),
        }
    }
}

/// `max_len` from a condition object; anything unreadable means no limit
fn parse_max_len(condition_param: &str) -> usize {
    let raw = condition_param.trim();
    if raw.is_empty() || raw == "{}" {
        return 0;
    }
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("max_len").and_then(|n| n.as_f64()))
        .filter(|n| *n > 0.0)
        .map(|n| n as usize)
        .unwrap_or(0)
}

/// A matched rule's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub rule_id: i64,
    pub action_type: String,
    pub content: String,
}

/// Rules ordered by priority, highest first
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile and order rules; ties keep source order
    pub fn build(rules: Vec<FastRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules.into_iter().filter_map(CompiledRule::compile).collect();
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Self { rules: compiled }
    }

    /// First rule hit by the trimmed input
    pub fn match_query(&self, input: &str) -> Option<RuleHit> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let input_len = input.chars().count();
        self.rules
            .iter()
            .find(|r| r.matches(input, input_len))
            .map(|r| RuleHit {
                rule_id: r.rule.id,
                action_type: r.rule.action_type.clone(),
                content: r.rule.action_content.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// =============================================================================
// Rule Source
// =============================================================================

/// Persistent rule storage
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn load_rules(&self) -> DecisionResult<Vec<FastRule>>;
}

/// In-memory rule source
#[derive(Debug, Default)]
pub struct MemoryRuleSource {
    rules: tokio::sync::RwLock<Vec<FastRule>>,
}

impl MemoryRuleSource {
    pub fn new(rules: Vec<FastRule>) -> Self {
        Self {
            rules: tokio::sync::RwLock::new(rules),
        }
    }

    pub async fn replace(&self, rules: Vec<FastRule>) {
        *self.rules.write().await = rules;
    }
}

#[async_trait]
impl RuleSource for MemoryRuleSource {
    async fn load_rules(&self) -> DecisionResult<Vec<FastRule>> {
        let mut rules = self.rules.read().await.clone();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }
}

// =============================================================================
// Rule Cache
// =============================================================================

/// Current rule snapshot shared by every request
#[derive(Debug, Default)]
pub struct RuleCache {
    snapshot: RwLock<Arc<RuleSet>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<FastRule>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RuleSet::build(rules))),
        }
    }

    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.snapshot.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Load, compile and swap; on failure the previous snapshot stays
    pub async fn reload(&self, source: &dyn RuleSource) -> DecisionResult<usize> {
        let rules = source.load_rules().await?;
        let set = Arc::new(RuleSet::build(rules));
        let count = set.len();
        *self.snapshot.write().unwrap_or_else(|p| p.into_inner()) = set;
        Ok(count)
    }

    pub fn match_query(&self, input: &str) -> Option<RuleHit> {
        self.snapshot().match_query(input)
    }

    /// Reload every `interval_ms` until shutdown
    pub async fn run_reload(
        &self,
        source: Arc<dyn RuleSource>,
        time: Arc<dyn TimeProvider>,
        interval_ms: u64,
        mut shutdown: watch::Receiver<bool>,
    ) {
        assert!(interval_ms > 0, "reload interval must be positive");
        loop {
            match self.reload(source.as_ref()).await {
                Ok(count) => tracing::debug!(count, "Fast rules reloaded"),
                Err(e) => tracing::warn!(error = %e, "Fast rule reload failed, keeping previous rules"),
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = time.sleep_ms(interval_ms) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecisionError;

    struct FailingSource;

    #[async_trait]
    impl RuleSource for FailingSource {
        async fn load_rules(&self) -> DecisionResult<Vec<FastRule>> {
            Err(DecisionError::store("fast rule", "connection refused"))
        }
    }

    #[test]
    fn test_priority_decides_precedence() {
        let set = RuleSet::build(vec![
            FastRule::keyword(1, "挂号科室", 5, "科室咨询"),
            FastRule::keyword(2, "挂号", 10, "挂号服务"),
        ]);
        let hit = set.match_query("挂号科室咨询").unwrap();
        assert_eq!(hit.rule_id, 2);
        assert_eq!(hit.content, "挂号服务");
    }

    #[test]
    fn test_max_len_gates_rule() {
        let set = RuleSet::build(vec![
            FastRule::keyword(1, "你好|您好", 1, "您好，请问有什么可以帮您？").with_condition(r#"{"max_len": 4}"#)
        ]);
        assert!(set.match_query(" 你好呀 ").is_some());
        assert!(set.match_query("你好，我想咨询一下").is_none());
    }

    #[test]
    fn test_regex_and_bad_rules() {
        let set = RuleSet::build(vec![
            FastRule::regex(1, r"^\d{11}$", 3, "请勿发送手机号"),
            FastRule::regex(2, r"(unclosed", 9, "never"),
            FastRule::keyword(3, "停车|车位", 1, "停车场在B1").with_condition("not json"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.match_query("13800138000").unwrap().rule_id, 1);
        assert_eq!(set.match_query("医院车位多吗").unwrap().rule_id, 3);
        assert!(set.match_query("   ").is_none());
    }

    #[test]
    fn test_empty_keywords_ignored() {
        let set = RuleSet::build(vec![FastRule::keyword(1, "||", 1, "x")]);
        assert!(set.match_query("anything").is_none());
    }

    #[tokio::test]
    async fn test_reload_swaps_snapshot() {
        let cache = RuleCache::new();
        let source = MemoryRuleSource::new(vec![FastRule::keyword(1, "停车", 1, "B1")]);
        assert_eq!(cache.reload(&source).await.unwrap(), 1);
        let before = cache.snapshot();

        source.replace(vec![FastRule::keyword(2, "食堂", 1, "三楼")]).await;
        cache.reload(&source).await.unwrap();
        assert!(cache.match_query("停车").is_none());
        assert_eq!(cache.match_query("食堂在哪").unwrap().content, "三楼");
        // readers holding the old snapshot keep a complete set
        assert_eq!(before.match_query("停车").unwrap().content, "B1");
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_rules() {
        let cache = RuleCache::with_rules(vec![FastRule::keyword(1, "停车", 1, "B1")]);
        assert!(cache.reload(&FailingSource).await.is_err());
        assert_eq!(cache.match_query("停车").unwrap().content, "B1");
    }
}
