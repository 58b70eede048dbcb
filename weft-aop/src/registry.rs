//! advice 注册表
//!
//! 按完整名称（`<类名>.<成员名>`）保存匹配到的 advice。每个容器一个，
//! 由 [`AopPlugin`](crate::AopPlugin) 安装时创建。

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::advice::{Advicer, Advices};

#[derive(Debug, Default)]
pub struct AdviceRegistry {
    entries: RwLock<HashMap<String, Advices>>,
}

impl AdviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把 advice 放进其连接点的分组，相同的 advice 只保留一份
    pub fn add(&self, advicer: Advicer) -> bool {
        let full_name = advicer.pointcut_match.full_name.clone();
        let description = advicer.describe();
        let kind = advicer.advice.kind;

        let added = self
            .entries
            .write()
            .entry(full_name.clone())
            .or_default()
            .add(advicer);
        if added {
            tracing::debug!("Bound {} advice {} to {}", kind, description, full_name);
        }
        added
    }

    /// 某个完整名称下的 advice（快照）
    pub fn get(&self, full_name: &str) -> Option<Advices> {
        self.entries.read().get(full_name).cloned()
    }

    pub fn has(&self, full_name: &str) -> bool {
        self.entries
            .read()
            .get(full_name)
            .is_some_and(|advices| !advices.is_empty())
    }

    /// 有 advice 的完整名称，排序后返回
    pub fn full_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 注册的 advice 总数
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Advices::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{AdviceKind, AdviceMetadata, AdviceOutput, PointcutMatch};
    use crate::joinpoint::Joinpoint;
    use crate::pointcut::Pointcut;
    use std::sync::Arc;
    use weft_core::{Class, Object, Token};

    fn advicer(full_name: &str, kind: AdviceKind, aspect: &Class) -> Advicer {
        let name = full_name.rsplit('.').next().unwrap_or(full_name).to_string();
        Advicer {
            pointcut_match: PointcutMatch {
                name,
                full_name: full_name.to_string(),
            },
            advice: AdviceMetadata {
                kind,
                pointcut: Pointcut::from("*"),
                method: "log".to_string(),
                handler: Arc::new(|_: &Arc<Object>, _: &Joinpoint| Ok(AdviceOutput::Continue)),
            },
            aspect_type: aspect.clone(),
            aspect_token: Token::from(aspect),
        }
    }

    #[test]
    fn test_registry_buckets_by_full_name() {
        let aspect = Class::builder("Logging").build();
        let registry = AdviceRegistry::new();

        assert!(registry.add(advicer("Room.enter", AdviceKind::Before, &aspect)));
        assert!(registry.add(advicer("Room.leave", AdviceKind::Before, &aspect)));
        assert!(!registry.add(advicer("Room.enter", AdviceKind::Before, &aspect)));
        assert!(registry.add(advicer("Room.enter", AdviceKind::After, &aspect)));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.full_names(), vec!["Room.enter", "Room.leave"]);
        assert!(registry.has("Room.enter"));
        assert!(!registry.has("Room.lock"));

        let enter = registry.get("Room.enter").unwrap();
        assert_eq!(enter.get(AdviceKind::Before).len(), 1);
        assert_eq!(enter.get(AdviceKind::After).len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }
}
