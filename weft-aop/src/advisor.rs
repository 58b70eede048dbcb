//! 切面与目标类的匹配
//!
//! 每个目标类的候选连接点是它自身及继承来的所有方法、getter、setter 名，
//! 外加 `constructor`。每个（切面, 目标类）组合只匹配一次。

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use weft_core::{Class, Token, CONSTRUCTOR};

use crate::advice::{Advicer, PointcutMatch};
use crate::aspect::{AdviceLookup, DeclaredAdvice};
use crate::registry::AdviceRegistry;

pub struct Advisor {
    lookup: Arc<dyn AdviceLookup>,
    aspects: RwLock<Vec<(Class, Token)>>,
    registry: AdviceRegistry,
    /// 已匹配过的（切面 id, 目标类 id）
    matched: Mutex<HashSet<(u64, u64)>>,
}

impl Advisor {
    pub fn new(lookup: Arc<dyn AdviceLookup>) -> Self {
        Self {
            lookup,
            aspects: RwLock::new(Vec::new()),
            registry: AdviceRegistry::new(),
            matched: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &AdviceRegistry {
        &self.registry
    }

    /// 登记切面，`token` 用于在织入时解析切面实例
    pub fn add_aspect(&self, aspect: &Class, token: Token) -> bool {
        let mut aspects = self.aspects.write();
        if aspects.iter().any(|(existing, _)| existing.id() == aspect.id()) {
            return false;
        }
        tracing::debug!("Registered aspect {} as {}", aspect.name(), token);
        aspects.push((aspect.clone(), token));
        true
    }

    pub fn aspects(&self) -> Vec<Class> {
        self.aspects
            .read()
            .iter()
            .map(|(class, _)| class.clone())
            .collect()
    }

    /// 目标类的候选连接点名
    pub fn join_points(target: &Class) -> Vec<String> {
        let mut names = target.member_names();
        if !names.iter().any(|name| name == CONSTRUCTOR) {
            names.push(CONSTRUCTOR.to_string());
        }
        names
    }

    /// 把一个切面的 advice 与目标类的连接点逐一匹配
    pub fn match_aspect(&self, aspect: &Class, token: &Token, target: &Class) -> Vec<Advicer> {
        let join_points = Self::join_points(target);
        let mut matches = Vec::new();

        for advice in self.lookup.advice(aspect) {
            let matcher = advice.pointcut.compile();
            for name in &join_points {
                let full_name = format!("{}.{}", target.name(), name);
                if !matcher.matches(&full_name) {
                    continue;
                }
                tracing::trace!(
                    "{} advice {}.{} matches {}",
                    advice.kind,
                    aspect.name(),
                    advice.method,
                    full_name
                );
                matches.push(Advicer {
                    pointcut_match: PointcutMatch {
                        name: name.clone(),
                        full_name,
                    },
                    advice: advice.clone(),
                    aspect_type: aspect.clone(),
                    aspect_token: token.clone(),
                });
            }
        }
        matches
    }

    /// 用所有已登记的切面匹配目标类，返回新加入注册表的 advice 数
    pub fn advise(&self, target: &Class) -> usize {
        let pending: Vec<(Class, Token)> = {
            let mut matched = self.matched.lock();
            self.aspects
                .read()
                .iter()
                .filter(|(aspect, _)| aspect.id() != target.id())
                .filter(|(aspect, _)| matched.insert((aspect.id(), target.id())))
                .cloned()
                .collect()
        };

        let mut added = 0;
        for (aspect, token) in pending {
            for advicer in self.match_aspect(&aspect, &token, target) {
                if self.registry.add(advicer) {
                    added += 1;
                }
            }
        }
        if added > 0 {
            tracing::debug!("Advised {} with {} advice(s)", target.name(), added);
        }
        added
    }
}

impl Default for Advisor {
    fn default() -> Self {
        Self::new(Arc::new(DeclaredAdvice))
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field(
                "aspects",
                &self
                    .aspects
                    .read()
                    .iter()
                    .map(|(class, _)| class.name().to_string())
                    .collect::<Vec<_>>(),
            )
            .field("registry", &self.registry.full_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{AdviceKind, AdviceOutput};
    use crate::aspect::AspectClassExt;
    use weft_core::{CallResult, Object, Outcome, Value};

    fn noop(_: &Arc<Object>, _: Vec<Value>) -> CallResult<Outcome> {
        Ok(Outcome::unit())
    }

    fn room() -> Class {
        Class::builder("Room")
            .method("enter", noop)
            .method("leave", noop)
            .getter("size", noop)
            .build()
    }

    #[test]
    fn test_join_points_include_constructor_and_inherited() {
        let base = Class::builder("Base").method("open", noop).build();
        let derived = Class::builder("Derived")
            .extends(&base)
            .method("close", noop)
            .build();
        assert_eq!(
            Advisor::join_points(&derived),
            vec!["open", "close", "constructor"]
        );
    }

    #[test]
    fn test_match_aspect_by_pointcut() {
        let aspect = Class::builder("Guard")
            .aspect()
            .before("execution(Room.*)", "check", |_, _| Ok(AdviceOutput::Continue))
            .after("Room.enter", "log", |_, _| Ok(AdviceOutput::Continue))
            .build();
        let room = room();
        let advisor = Advisor::default();

        let matches = advisor.match_aspect(&aspect, &Token::from(&aspect), &room);
        let names: Vec<(AdviceKind, String)> = matches
            .iter()
            .map(|m| (m.advice.kind, m.pointcut_match.full_name.clone()))
            .collect();
        assert_eq!(
            names,
            vec![
                (AdviceKind::Before, "Room.enter".to_string()),
                (AdviceKind::Before, "Room.leave".to_string()),
                (AdviceKind::Before, "Room.size".to_string()),
                (AdviceKind::Before, "Room.constructor".to_string()),
                (AdviceKind::After, "Room.enter".to_string()),
            ]
        );
    }

    #[test]
    fn test_advise_matches_each_pair_once() {
        let aspect = Class::builder("Guard")
            .aspect()
            .before("Room.enter", "check", |_, _| Ok(AdviceOutput::Continue))
            .build();
        let room = room();
        let advisor = Advisor::default();

        assert!(advisor.add_aspect(&aspect, Token::from(&aspect)));
        assert!(!advisor.add_aspect(&aspect, Token::from(&aspect)));

        assert_eq!(advisor.advise(&room), 1);
        assert_eq!(advisor.advise(&room), 0);
        assert!(advisor.registry().has("Room.enter"));
        assert!(!advisor.registry().has("Room.leave"));

        // 切面自身不参与匹配
        assert_eq!(advisor.advise(&aspect), 0);
    }
}
