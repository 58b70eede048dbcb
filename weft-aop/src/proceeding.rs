//! 返回后 advice 的执行策略
//!
//! 后置 advice 要观察调用的"最终"结果。普通值立即可用；延迟值要等它完成；
//! 推送流有多次发射，每次发射都要单独经过 advice 链。[`Recognizer`] 根据
//! 返回值形态选择对应的 [`Proceeding`]。
//!
//! 调用成功后的全部阶段都由策略运行：Around（状态 After）、
//! Around + AfterReturning 或 Around + AfterThrowing，最后是 After。
//! 延迟值在完成后运行这些阶段，流在每次发射时运行前两个阶段，
//! 在结束或出错时运行 After。

use std::sync::Arc;

use futures::future::{self, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use weft_core::value::error_stream;
use weft_core::{CallError, CallResult, Outcome, Value};

use crate::advice::{AdviceOutput, CallPhase};
use crate::joinpoint::Joinpoint;
use crate::weaver::{run_phase, BoundAdvice};

/// 返回值形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Sync,
    Deferred,
    Stream,
}

/// 调用返回后要运行的 advice
#[derive(Clone)]
pub struct AfterChain {
    /// 调用时的连接点，策略在其上设置状态和返回值
    pub joinpoint: Joinpoint,
    /// Around，状态 After，不替换返回值
    pub returned: Arc<[BoundAdvice]>,
    /// Around + AfterReturning
    pub returning: Arc<[BoundAdvice]>,
    /// Around + AfterThrowing，调用失败、延迟值失败或流发射错误时运行
    pub throwing: Arc<[BoundAdvice]>,
    /// After，无论成功失败都运行
    pub finally: Arc<[BoundAdvice]>,
}

impl AfterChain {
    /// 对一个结果值运行 Around（状态 After），返回供 AfterReturning 使用的连接点
    fn returned(&self, value: &Value) -> CallResult<Joinpoint> {
        let mut jp = self.joinpoint.clone();
        jp.returning = Some(value.clone());
        run_phase(&self.returned, CallPhase::Returned, &mut jp)?;
        jp.state = CallPhase::AfterReturning.state();
        Ok(jp)
    }

    /// 运行异常 advice，返回要继续传播的错误
    pub fn throw(&self, error: CallError) -> CallError {
        let mut jp = self.joinpoint.clone();
        jp.throwing = Some(error.clone());
        match run_phase(&self.throwing, CallPhase::AfterThrowing, &mut jp) {
            Ok(()) => error,
            Err(advice_error) => advice_error,
        }
    }

    /// 运行 After advice 并给出调用的最终结果
    ///
    /// 成功时 After 的错误成为调用结果；已经失败时只记录 After 的错误，原始错误胜出。
    pub fn finish<T>(&self, result: CallResult<T>, returning: Option<Value>) -> CallResult<T> {
        let mut jp = self.joinpoint.clone();
        jp.returning = returning;
        jp.throwing = result.as_ref().err().cloned();

        match (result, run_phase(&self.finally, CallPhase::Finally, &mut jp)) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(after_error)) => Err(after_error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(after_error)) => {
                tracing::warn!(
                    "After advice of {} failed while the call was already failing: {}",
                    jp.full_name,
                    after_error
                );
                Err(error)
            }
        }
    }

    /// 流结束时运行 After；只有 After 自身出错且流没有出错时才多发射一个错误
    fn close(&self, tail: StreamTail) -> Option<CallResult<Value>> {
        match tail.error {
            Some(error) => {
                let _ = self.finish(Err::<(), _>(error), None);
                None
            }
            None => self.finish(Ok(()), tail.last).err().map(Err),
        }
    }
}

pub trait Proceeding: Send + Sync {
    fn proceed(&self, outcome: Outcome, chain: AfterChain) -> CallResult<Outcome>;
}

/// 识别返回值形态
pub struct Recognizer;

static SYNC: SyncProceeding = SyncProceeding;
static DEFERRED: DeferredProceeding = DeferredProceeding;
static STREAM: StreamProceeding = StreamProceeding;

impl Recognizer {
    pub fn recognize(outcome: &Outcome) -> ReturnShape {
        match outcome {
            Outcome::Ready(_) => ReturnShape::Sync,
            Outcome::Deferred(_) => ReturnShape::Deferred,
            Outcome::Stream(_) => ReturnShape::Stream,
        }
    }

    pub fn strategy(shape: ReturnShape) -> &'static dyn Proceeding {
        match shape {
            ReturnShape::Sync => &SYNC,
            ReturnShape::Deferred => &DEFERRED,
            ReturnShape::Stream => &STREAM,
        }
    }
}

/// 普通值：依次运行 advice，advice 返回值时替换当前值
///
/// advice 返回延迟值或流时无法同步展开，该结果直接作为调用结果，剩余 advice 不再运行。
pub struct SyncProceeding;

impl SyncProceeding {
    fn settle(chain: &AfterChain, mut current: Value) -> CallResult<Outcome> {
        let mut jp = chain.returned(&current)?;
        for advice in chain.returning.iter() {
            jp.returning = Some(current.clone());
            match advice.call(&jp)? {
                AdviceOutput::Return(Outcome::Ready(value)) => current = value,
                AdviceOutput::Return(other) => {
                    tracing::debug!(
                        "{} returned a {} value from {}, skipping remaining advice",
                        advice.describe(),
                        other.kind(),
                        jp.full_name
                    );
                    return Ok(other);
                }
                _ => {}
            }
        }
        Ok(Outcome::Ready(current))
    }
}

impl Proceeding for SyncProceeding {
    fn proceed(&self, outcome: Outcome, chain: AfterChain) -> CallResult<Outcome> {
        let result = match outcome {
            Outcome::Ready(value) => Self::settle(&chain, value),
            other => Ok(other),
        };
        let returning = match &result {
            Ok(Outcome::Ready(value)) => Some(value.clone()),
            _ => None,
        };
        chain.finish(result, returning)
    }
}

/// 延迟值：完成后按顺序运行 advice，每个 advice 的返回值等待完成后再交给下一个
pub struct DeferredProceeding;

impl DeferredProceeding {
    async fn settle(chain: &AfterChain, mut current: Value) -> CallResult<Value> {
        let mut jp = chain.returned(&current)?;
        for advice in chain.returning.iter() {
            jp.returning = Some(current.clone());
            if let AdviceOutput::Return(replacement) = advice.call(&jp)? {
                current = replacement.resolve().await?;
            }
        }
        Ok(current)
    }
}

impl Proceeding for DeferredProceeding {
    fn proceed(&self, outcome: Outcome, chain: AfterChain) -> CallResult<Outcome> {
        let Outcome::Deferred(future) = outcome else {
            return SYNC.proceed(outcome, chain);
        };

        Ok(Outcome::Deferred(
            async move {
                let settled = match future.await {
                    Ok(value) => Self::settle(&chain, value).await,
                    Err(error) => Err(chain.throw(error)),
                };
                let returning = settled.as_ref().ok().cloned();
                chain.finish(settled, returning)
            }
            .boxed(),
        ))
    }
}

/// 流已经发射过的内容，流结束时交给 After
#[derive(Debug, Clone, Default)]
struct StreamTail {
    last: Option<Value>,
    error: Option<CallError>,
}

/// 推送流：每次发射单独经过 advice 链，保持发射次数
///
/// advice 返回的替换值（可以是延迟值或流）取代这次发射。第一个错误发射之后流结束。
/// 流是惰性的，advice 只在调用方拉取时运行；丢弃流即取消整条链，此时 After 不运行。
pub struct StreamProceeding;

impl Proceeding for StreamProceeding {
    fn proceed(&self, outcome: Outcome, chain: AfterChain) -> CallResult<Outcome> {
        let Outcome::Stream(source) = outcome else {
            return SYNC.proceed(outcome, chain);
        };

        let tail: Arc<Mutex<StreamTail>> = Default::default();
        let recorder = Arc::clone(&tail);
        let emitting = chain.clone();

        let body = source
            .flat_map(move |item| match item {
                Ok(value) => match emitting.returned(&value) {
                    Ok(jp) => through(emitting.clone(), jp, 0, value),
                    Err(error) => error_stream(error),
                },
                Err(error) => error_stream(emitting.throw(error)),
            })
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .inspect(move |item| {
                let mut tail = recorder.lock();
                match item {
                    Ok(value) => tail.last = Some(value.clone()),
                    Err(error) => tail.error = Some(error.clone()),
                }
            });

        let closing = stream::once(future::lazy(move |_| {
            let tail = tail.lock().clone();
            chain.close(tail)
        }))
        .filter_map(future::ready);

        Ok(Outcome::Stream(body.chain(closing).boxed()))
    }
}

/// 从第 `index` 个 advice 开始处理一次发射
fn through(
    chain: AfterChain,
    mut jp: Joinpoint,
    index: usize,
    value: Value,
) -> BoxStream<'static, CallResult<Value>> {
    let Some(advice) = chain.returning.get(index).cloned() else {
        return stream::once(future::ready(Ok(value))).boxed();
    };

    jp.returning = Some(value.clone());
    match advice.call(&jp) {
        Err(error) => error_stream(error),
        Ok(AdviceOutput::Return(replacement)) => replacement
            .into_stream()
            .flat_map(move |item| match item {
                Ok(next) => through(chain.clone(), jp.clone(), index + 1, next),
                Err(error) => error_stream(error),
            })
            .boxed(),
        Ok(_) => through(chain, jp, index + 1, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizer() {
        assert_eq!(Recognizer::recognize(&Outcome::unit()), ReturnShape::Sync);
        assert_eq!(
            Recognizer::recognize(&Outcome::deferred(async { Ok(Value::unit()) })),
            ReturnShape::Deferred
        );
        assert_eq!(
            Recognizer::recognize(&Outcome::iter(vec![Value::unit()])),
            ReturnShape::Stream
        );
    }
}
