//! 切面（Aspect）定义
//!
//! 切面是带 `@Aspect` 装饰器的普通类，它的 advice 声明保存在类描述符的
//! [`AspectMetadata`] 扩展里。切面本身从不被织入。

use std::sync::Arc;
use std::time::Duration;

use weft_core::{CallResult, Class, ClassBuilder, Object, ASPECT, INJECTABLE};

use crate::advice::{AdviceKind, AdviceMetadata, AdviceOutput};
use crate::joinpoint::Joinpoint;
use crate::pointcut::Pointcut;

/// 切面类上声明的 advice
#[derive(Debug, Clone, Default)]
pub struct AspectMetadata {
    pub advice: Vec<AdviceMetadata>,
}

/// 读取切面类声明的 advice
pub trait AdviceLookup: Send + Sync {
    fn advice(&self, aspect: &Class) -> Vec<AdviceMetadata>;
}

/// 读取 [`AspectMetadata`] 扩展
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredAdvice;

impl AdviceLookup for DeclaredAdvice {
    fn advice(&self, aspect: &Class) -> Vec<AdviceMetadata> {
        aspect
            .extension::<AspectMetadata>()
            .map(|metadata| metadata.advice.clone())
            .unwrap_or_default()
    }
}

/// 在 `ClassBuilder` 上声明切面与 advice
pub trait AspectClassExt: Sized {
    /// 标记为切面：以 `@Aspect` 取代 `@Injectable`
    fn aspect(self) -> Self;

    fn advice<F>(self, kind: AdviceKind, pointcut: impl Into<Pointcut>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static;

    fn before<F>(self, pointcut: impl Into<Pointcut>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static,
    {
        self.advice(AdviceKind::Before, pointcut, method, handler)
    }

    fn around<F>(self, pointcut: impl Into<Pointcut>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static,
    {
        self.advice(AdviceKind::Around, pointcut, method, handler)
    }

    fn after<F>(self, pointcut: impl Into<Pointcut>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static,
    {
        self.advice(AdviceKind::After, pointcut, method, handler)
    }

    fn after_returning<F>(self, pointcut: impl Into<Pointcut>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static,
    {
        self.advice(AdviceKind::AfterReturning, pointcut, method, handler)
    }

    fn after_throwing<F>(self, pointcut: impl Into<Pointcut>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static,
    {
        self.advice(AdviceKind::AfterThrowing, pointcut, method, handler)
    }

    fn pointcut_advice<F>(self, pointcut: impl Into<Pointcut>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static,
    {
        self.advice(AdviceKind::Pointcut, pointcut, method, handler)
    }
}

impl AspectClassExt for ClassBuilder {
    fn aspect(self) -> Self {
        self.without_decorator(INJECTABLE)
            .decorator(ASPECT)
            .with_extension(|_: &mut AspectMetadata| {})
    }

    fn advice<F>(self, kind: AdviceKind, pointcut: impl Into<Pointcut>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static,
    {
        let advice = AdviceMetadata {
            kind,
            pointcut: pointcut.into(),
            method: method.into(),
            handler: Arc::new(handler),
        };
        self.with_extension(move |metadata: &mut AspectMetadata| metadata.advice.push(advice))
    }
}

// ============================================================================
// 预定义的常用切面
// ============================================================================

/// 日志切面：记录匹配方法的进入、退出和异常
pub fn logging_aspect(pointcut: &str) -> Class {
    Class::builder("LoggingAspect")
        .aspect()
        .before(pointcut, "log_enter", |_, jp| {
            tracing::info!("→ Entering: {}", jp.signature());
            Ok(AdviceOutput::Continue)
        })
        .after_throwing(pointcut, "log_error", |_, jp| {
            if let Some(info) = jp.error_info() {
                tracing::error!("Exception in {}: {}", jp.signature(), info.full_description());
            }
            Ok(AdviceOutput::Continue)
        })
        .after(pointcut, "log_exit", |_, jp| {
            tracing::info!("← Exiting: {} (took {:?})", jp.signature(), jp.elapsed());
            Ok(AdviceOutput::Continue)
        })
        .build()
}

/// 性能监控切面：调用超过阈值时告警
pub fn performance_aspect(pointcut: &str, threshold: Duration) -> Class {
    Class::builder("PerformanceAspect")
        .aspect()
        .after(pointcut, "check_elapsed", move |_, jp| {
            let elapsed = jp.elapsed();
            if elapsed > threshold {
                tracing::warn!(
                    "Slow method detected: {} took {:?} (threshold: {:?})",
                    jp.signature(),
                    elapsed,
                    threshold
                );
            }
            Ok(AdviceOutput::Continue)
        })
        .build()
}
