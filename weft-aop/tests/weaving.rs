//! 容器 + AOP 插件的端到端测试

use std::sync::Arc;

use parking_lot::Mutex;
use weft_aop::prelude::*;
use weft_aop::{advisor_of, AdviceKind};
use weft_core::{
    CallError, CallResult, Class, ConstructorArgs, Container, MemberSlot, Object, Outcome, Value,
};

type Log = Arc<Mutex<Vec<String>>>;

fn container() -> Container {
    Container::builder().plugin(AopPlugin::new()).build().unwrap()
}

fn ready_i32(outcome: Outcome) -> i32 {
    *outcome
        .into_ready()
        .and_then(|value| value.downcast::<i32>())
        .unwrap()
}

fn record(
    log: &Log,
    label: &'static str,
) -> impl Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static {
    let log = log.clone();
    move |_, _| {
        log.lock().push(label.to_string());
        Ok(AdviceOutput::Continue)
    }
}

fn arg_i32(args: &[Value], index: usize) -> i32 {
    *args[index].downcast_ref::<i32>().unwrap()
}

#[test]
fn test_singleton_person_shared_through_weaving() {
    struct Person {
        name: String,
    }

    let log: Log = Default::default();
    let person = Class::builder("Person")
        .singleton()
        .constructor(|_: ConstructorArgs| {
            Ok(Person {
                name: "testor".to_string(),
            })
        })
        .getter("name", |obj, _| {
            let name = obj.with_state(|p: &Person| p.name.clone()).unwrap_or_default();
            Ok(Outcome::of(name))
        })
        .build();
    let audit = {
        let log = log.clone();
        Class::builder("Audit")
            .aspect()
            .before("Person.name", "read", move |_, jp| {
                log.lock().push(jp.full_name.clone());
                Ok(AdviceOutput::Continue)
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&audit).unwrap();
    c.register_self(&person).unwrap();

    let first = c.get_object(&person).unwrap();
    let second = c.get_object(&person).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    first.with_state_mut(|p: &mut Person| p.name = "changed".to_string());
    let name = second.get_property("name").unwrap().into_ready().unwrap();
    assert_eq!(name.downcast_ref::<String>().unwrap(), "changed");
    assert_eq!(*log.lock(), vec!["Person.name"]);
}

#[test]
fn test_before_advice_runs_once_ahead_of_body() {
    let log: Log = Default::default();
    let room = {
        let log = log.clone();
        Class::builder("Room")
            .method("enter", move |_, _| {
                log.lock().push("enter".to_string());
                Ok(Outcome::of(7i32))
            })
            .build()
    };
    let guard = {
        let log = log.clone();
        Class::builder("Guard")
            .aspect()
            .before("execution(Room.*)", "check", move |_, jp| {
                log.lock().push(format!("check {}", jp.full_name));
                Ok(AdviceOutput::Continue)
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&guard).unwrap();
    c.register_self(&room).unwrap();

    let outcome = c.invoke(&room, "enter", vec![]).unwrap();
    assert_eq!(ready_i32(outcome), 7);
    assert_eq!(
        *log.lock(),
        vec!["check Room.constructor", "check Room.enter", "enter"]
    );
}

#[test]
fn test_advice_ordering_on_success() {
    let log: Log = Default::default();
    let service = {
        let log = log.clone();
        Class::builder("Service")
            .method("run", move |_, _| {
                log.lock().push("run".to_string());
                Ok(Outcome::unit())
            })
            .build()
    };

    let tracer = {
        let around_log = log.clone();
        Class::builder("Tracer")
            .aspect()
            .around("Service.run", "around", move |_, jp| {
                around_log.lock().push(format!("around:{:?}", jp.state));
                Ok(AdviceOutput::Continue)
            })
            .before("Service.run", "before", record(&log, "before"))
            .pointcut_advice("Service.run", "pointcut", record(&log, "pointcut"))
            .after_returning("Service.run", "after_returning", record(&log, "after_returning"))
            .after_throwing("Service.run", "after_throwing", record(&log, "after_throwing"))
            .after("Service.run", "after", record(&log, "after"))
            .build()
    };

    let c = container();
    c.register_self_singleton(&tracer).unwrap();
    c.register_self(&service).unwrap();
    c.invoke(&service, "run", vec![]).unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "around:Before",
            "before",
            "pointcut",
            "run",
            "around:After",
            "around:AfterReturning",
            "after_returning",
            "after",
        ]
    );
}

#[test]
fn test_argument_replacement_scope() {
    let calc = Class::builder("Calc")
        .method("echo", |_, args| Ok(Outcome::of(arg_i32(&args, 0))))
        .build();
    let rewrite = Class::builder("Rewrite")
        .aspect()
        .around("Calc.echo", "seed", |_, jp| {
            Ok(match jp.state {
                JoinpointState::Before => AdviceOutput::Args(vec![Value::new(2i32)]),
                _ => AdviceOutput::Continue,
            })
        })
        .before("Calc.echo", "ignored", |_, _| {
            Ok(AdviceOutput::Args(vec![Value::new(100i32)]))
        })
        .pointcut_advice("Calc.echo", "scale", |_, jp| {
            let seed = *jp.arg::<i32>(0).unwrap();
            Ok(AdviceOutput::Args(vec![Value::new(seed * 10)]))
        })
        .build();

    let c = container();
    c.register_self_singleton(&rewrite).unwrap();
    c.register_self(&calc).unwrap();

    let outcome = c.invoke(&calc, "echo", vec![Value::new(1i32)]).unwrap();
    assert_eq!(ready_i32(outcome), 20);
}

#[test]
fn test_after_runs_on_failure_and_error_is_rethrown() {
    let thrown: Arc<Mutex<Option<CallError>>> = Default::default();
    let observed: Arc<Mutex<Option<CallError>>> = Default::default();
    let log: Log = Default::default();

    let worker = {
        let thrown = thrown.clone();
        Class::builder("Worker")
            .method("fail", move |_, _| {
                let error = CallError::msg("boom");
                *thrown.lock() = Some(error.clone());
                Err(error)
            })
            .build()
    };
    let watcher = {
        let observed = observed.clone();
        let returning_log = log.clone();
        let after_log = log.clone();
        Class::builder("Watcher")
            .aspect()
            .after_throwing("Worker.fail", "capture", move |_, jp| {
                *observed.lock() = jp.throwing.clone();
                Ok(AdviceOutput::Continue)
            })
            .after_returning("Worker.fail", "never", move |_, _| {
                returning_log.lock().push("after_returning".to_string());
                Ok(AdviceOutput::Continue)
            })
            .after("Worker.fail", "finally", move |_, jp| {
                after_log.lock().push(format!("after:{:?}", jp.state));
                Ok(AdviceOutput::Continue)
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&watcher).unwrap();
    c.register_self(&worker).unwrap();

    let error = c.invoke(&worker, "fail", vec![]).unwrap_err();
    let thrown = thrown.lock().clone().unwrap();
    let observed = observed.lock().clone().unwrap();

    assert!(CallError::ptr_eq(&error, &thrown));
    assert!(CallError::ptr_eq(&observed, &thrown));
    assert_eq!(*log.lock(), vec!["after:After"]);
}

#[test]
fn test_before_advice_error_aborts_the_call() {
    let log: Log = Default::default();
    let door = {
        let log = log.clone();
        Class::builder("Door")
            .method("open", move |_, _| {
                log.lock().push("open".to_string());
                Ok(Outcome::unit())
            })
            .build()
    };
    let lock = {
        let throwing_log = log.clone();
        let after_log = log.clone();
        Class::builder("Lock")
            .aspect()
            .before("Door.open", "deny", |_, _| Err(CallError::msg("locked")))
            .after_throwing("Door.open", "report", move |_, jp| {
                let info = jp.error_info().unwrap();
                throwing_log.lock().push(format!("throwing:{}", info.message));
                Ok(AdviceOutput::Continue)
            })
            .after("Door.open", "finally", move |_, _| {
                after_log.lock().push("after".to_string());
                Ok(AdviceOutput::Continue)
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&lock).unwrap();
    c.register_self(&door).unwrap();

    let error = c.invoke(&door, "open", vec![]).unwrap_err();
    assert_eq!(error.to_string(), "locked");
    assert_eq!(*log.lock(), vec!["throwing:locked", "after"]);
}

#[test]
fn test_after_returning_replaces_sync_value() {
    let counter = Class::builder("Counter")
        .method("count", |_, _| Ok(Outcome::of(1i32)))
        .build();
    let boost = Class::builder("Boost")
        .aspect()
        .after_returning("Counter.count", "add", |_, jp| {
            let current = *jp.returning_as::<i32>().unwrap();
            Ok(AdviceOutput::value(current + 41))
        })
        .build();

    let c = container();
    c.register_self_singleton(&boost).unwrap();
    c.register_self(&counter).unwrap();

    assert_eq!(ready_i32(c.invoke(&counter, "count", vec![]).unwrap()), 42);
}

#[tokio::test]
async fn test_deferred_substitution() {
    let seen: Arc<Mutex<Vec<i32>>> = Default::default();
    let store = Class::builder("Store")
        .method("load", |_, _| {
            Ok(Outcome::deferred(async { Ok(Value::new(1i32)) }))
        })
        .method("fetch", |_, _| {
            Ok(Outcome::deferred(async { Ok(Value::new(1i32)) }))
        })
        .build();
    let cache = {
        let seen = seen.clone();
        Class::builder("Cache")
            .aspect()
            .after_returning("Store.load", "observe", move |_, jp| {
                seen.lock().push(*jp.returning_as::<i32>().unwrap());
                Ok(AdviceOutput::Continue)
            })
            .after_returning("Store.fetch", "replace", |_, _| {
                Ok(AdviceOutput::Return(Outcome::deferred(async {
                    Ok(Value::new(5i32))
                })))
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&cache).unwrap();
    c.register_self(&store).unwrap();
    let object = c.get_object(&store).unwrap();

    let loaded = object.invoke("load", vec![]).unwrap();
    assert!(!loaded.is_ready());
    // 延迟值完成前后置 advice 不运行
    assert!(seen.lock().is_empty());
    let loaded = loaded.resolve().await.unwrap();
    assert_eq!(*loaded.downcast_ref::<i32>().unwrap(), 1);
    assert_eq!(*seen.lock(), vec![1]);

    let fetched = object.invoke("fetch", vec![]).unwrap().resolve().await.unwrap();
    assert_eq!(*fetched.downcast_ref::<i32>().unwrap(), 5);
}

fn after_observer(log: &Log) -> impl Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync + 'static {
    let log = log.clone();
    move |_, jp| {
        let seen = match (jp.returning_as::<i32>(), &jp.throwing) {
            (Some(value), _) => value.to_string(),
            (None, Some(error)) => error.to_string(),
            (None, None) => "nothing".to_string(),
        };
        log.lock().push(format!("after:{}", seen));
        Ok(AdviceOutput::Continue)
    }
}

#[tokio::test]
async fn test_deferred_after_advice_waits_for_settlement() {
    let log: Log = Default::default();
    let job = Class::builder("Job")
        .method("ok", |_, _| {
            Ok(Outcome::deferred(async { Ok(Value::new(1i32)) }))
        })
        .method("bad", |_, _| {
            Ok(Outcome::deferred(async { Err(CallError::msg("rejected")) }))
        })
        .build();
    let monitor = {
        let around_log = log.clone();
        Class::builder("JobMonitor")
            .aspect()
            .around("Job.*", "around", move |_, jp| {
                around_log.lock().push(format!("around:{:?}", jp.state));
                Ok(AdviceOutput::Continue)
            })
            .after_returning("Job.*", "returned", record(&log, "after_returning"))
            .after_throwing("Job.*", "thrown", record(&log, "after_throwing"))
            .after("Job.*", "finally", after_observer(&log))
            .build()
    };

    let c = container();
    c.register_self_singleton(&monitor).unwrap();
    c.register_self(&job).unwrap();
    let object = c.get_object(&job).unwrap();
    log.lock().clear();

    let pending = object.invoke("ok", vec![]).unwrap();
    assert_eq!(*log.lock(), vec!["around:Before"]);
    let value = pending.resolve().await.unwrap();
    assert_eq!(*value.downcast_ref::<i32>().unwrap(), 1);
    assert_eq!(
        *log.lock(),
        vec![
            "around:Before",
            "around:After",
            "around:AfterReturning",
            "after_returning",
            "after:1",
        ]
    );

    log.lock().clear();
    let pending = object.invoke("bad", vec![]).unwrap();
    assert_eq!(*log.lock(), vec!["around:Before"]);
    let error = pending.resolve().await.unwrap_err();
    assert_eq!(error.to_string(), "rejected");
    assert_eq!(
        *log.lock(),
        vec![
            "around:Before",
            "around:AfterThrowing",
            "after_throwing",
            "after:rejected",
        ]
    );
}

#[tokio::test]
async fn test_stream_after_advice_runs_at_termination() {
    use futures::StreamExt;

    let log: Log = Default::default();
    let ticker = Class::builder("Ticker")
        .method("ticks", |_, _| {
            Ok(Outcome::iter(vec![Value::new(1i32), Value::new(2i32)]))
        })
        .method("broken", |_, _| {
            Ok(Outcome::stream(futures::stream::iter(vec![
                Ok(Value::new(1i32)),
                Err(CallError::msg("lost signal")),
                Ok(Value::new(3i32)),
            ])))
        })
        .build();
    let monitor = Class::builder("TickMonitor")
        .aspect()
        .after_returning("Ticker.*", "returned", record(&log, "after_returning"))
        .after_throwing("Ticker.*", "thrown", record(&log, "after_throwing"))
        .after("Ticker.*", "finally", after_observer(&log))
        .build();

    let c = container();
    c.register_self_singleton(&monitor).unwrap();
    c.register_self(&ticker).unwrap();
    let object = c.get_object(&ticker).unwrap();
    log.lock().clear();

    let values = object.invoke("ticks", vec![]).unwrap().collect().await.unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(
        *log.lock(),
        vec!["after_returning", "after_returning", "after:2"]
    );

    log.lock().clear();
    let mut stream = object.invoke("broken", vec![]).unwrap().into_stream();
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item.map(|value| *value.downcast_ref::<i32>().unwrap()));
    }
    // 错误发射之后流结束
    assert_eq!(items.len(), 2);
    assert_eq!(*items[0].as_ref().unwrap(), 1);
    assert_eq!(items[1].as_ref().unwrap_err().to_string(), "lost signal");
    assert_eq!(
        *log.lock(),
        vec!["after_returning", "after_throwing", "after:lost signal"]
    );
}

#[tokio::test]
async fn test_stream_emissions_pass_through_advice_individually() {
    let calls: Arc<Mutex<usize>> = Default::default();
    let feed = Class::builder("Feed")
        .method("items", |_, _| {
            Ok(Outcome::iter(vec![
                Value::new(1i32),
                Value::new(2i32),
                Value::new(3i32),
            ]))
        })
        .build();
    let doubler = {
        let calls = calls.clone();
        Class::builder("Doubler")
            .aspect()
            .after_returning("Feed.items", "double", move |_, jp| {
                *calls.lock() += 1;
                let value = *jp.returning_as::<i32>().unwrap();
                Ok(AdviceOutput::value(value * 2))
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&doubler).unwrap();
    c.register_self(&feed).unwrap();

    let outcome = c.invoke(&feed, "items", vec![]).unwrap();
    // 流是惰性的，未拉取前 advice 不运行
    assert_eq!(*calls.lock(), 0);

    let values: Vec<i32> = outcome
        .collect()
        .await
        .unwrap()
        .iter()
        .map(|v| *v.downcast_ref::<i32>().unwrap())
        .collect();
    assert_eq!(values, vec![2, 4, 6]);
    assert_eq!(*calls.lock(), 3);
}

#[tokio::test]
async fn test_stream_error_runs_throwing_advice() {
    let log: Log = Default::default();
    let feed = Class::builder("Pipe")
        .method("items", |_, _| {
            Ok(Outcome::stream(futures::stream::iter(vec![
                Ok(Value::new(1i32)),
                Err(CallError::msg("broken")),
            ])))
        })
        .build();
    let monitor = {
        let log = log.clone();
        Class::builder("Monitor")
            .aspect()
            .after_throwing("Pipe.items", "report", move |_, jp| {
                log.lock().push(jp.throwing.as_ref().unwrap().to_string());
                Ok(AdviceOutput::Continue)
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&monitor).unwrap();
    c.register_self(&feed).unwrap();

    let error = c
        .invoke(&feed, "items", vec![])
        .unwrap()
        .collect()
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "broken");
    assert_eq!(*log.lock(), vec!["broken"]);
}

#[test]
fn test_two_aspects_keep_both_around_advice() {
    let log: Log = Default::default();
    let service = Class::builder("Service")
        .method("run", |_, _| Ok(Outcome::unit()))
        .build();
    let aspect = |name: &'static str| {
        let log = log.clone();
        Class::builder(name)
            .aspect()
            .around("execution(Service.run)", "wrap", move |_, jp| {
                if jp.state == JoinpointState::Before {
                    log.lock().push(name.to_string());
                }
                Ok(AdviceOutput::Continue)
            })
            .build()
    };
    let first = aspect("TimingA");
    let second = aspect("TimingB");

    let c = container();
    c.register_self_singleton(&first).unwrap();
    c.register_self_singleton(&second).unwrap();
    c.register_self(&service).unwrap();
    c.invoke(&service, "run", vec![]).unwrap();

    let advisor = advisor_of(&c).unwrap();
    let advices = advisor.registry().get("Service.run").unwrap();
    assert_eq!(advices.get(AdviceKind::Around).len(), 2);
    assert_eq!(*log.lock(), vec!["TimingA", "TimingB"]);
}

#[test]
fn test_aspects_are_never_woven() {
    let log: Log = Default::default();
    let spy = {
        let log = log.clone();
        Class::builder("Spy")
            .aspect()
            .method("helper", |_, _| Ok(Outcome::unit()))
            .before("*", "watch", move |_, jp| {
                log.lock().push(jp.full_name.clone());
                Ok(AdviceOutput::Continue)
            })
            .build()
    };
    let room = Class::builder("Room")
        .method("enter", |_, _| Ok(Outcome::unit()))
        .build();

    let c = container();
    c.register_self_singleton(&spy).unwrap();
    c.register_self(&room).unwrap();

    let aspect = c.get_object(&spy).unwrap();
    aspect.invoke("helper", vec![]).unwrap();
    assert!(!aspect.is_decorated("helper", MemberSlot::Method));

    c.invoke(&room, "enter", vec![]).unwrap();
    assert_eq!(*log.lock(), vec!["Room.constructor", "Room.enter"]);
}

#[test]
fn test_constructor_advice() {
    struct Label(String);

    let log: Log = Default::default();
    let badge = Class::builder("Badge")
        .untyped_param("label")
        .constructor(|args: ConstructorArgs| {
            let label = args
                .get::<String>(0)
                .map(|s| s.as_str().to_string())
                .unwrap_or_default();
            Ok(Label(label))
        })
        .build();
    let patch = {
        let around_log = log.clone();
        let returning_log = log.clone();
        Class::builder("Patch")
            .aspect()
            .around("Badge.constructor", "patch", move |_, jp| {
                around_log.lock().push(format!("around:{:?}", jp.state));
                Ok(match jp.state {
                    JoinpointState::Before => {
                        AdviceOutput::Args(vec![Value::new("patched".to_string())])
                    }
                    _ => AdviceOutput::Continue,
                })
            })
            .after_returning("Badge.constructor", "created", move |_, jp| {
                let created = jp.returning.as_ref().and_then(Value::as_object).is_some();
                returning_log.lock().push(format!("created:{}", created));
                Ok(AdviceOutput::Continue)
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&patch).unwrap();
    c.register_self(&badge).unwrap();

    let object = c.get_object(&badge).unwrap();
    let label = object.with_state(|l: &Label| l.0.clone()).unwrap();
    assert_eq!(label, "patched");
    assert_eq!(
        *log.lock(),
        vec![
            "around:Before",
            "around:After",
            "around:AfterReturning",
            "created:true",
        ]
    );
}

#[test]
fn test_getter_and_setter_are_woven_independently() {
    let log: Log = Default::default();
    let cell = Class::builder("Cell")
        .getter("size", |obj, _| {
            obj.field("inner")
                .map(Outcome::Ready)
                .ok_or_else(|| CallError::msg("unset"))
        })
        .setter("size", |obj, args| {
            obj.set_field("inner", args[0].clone());
            Ok(Outcome::unit())
        })
        .build();
    let access = {
        let log = log.clone();
        Class::builder("Access")
            .aspect()
            .before("Cell.size", "touch", move |_, jp| {
                log.lock().push(format!("{}:{}", jp.full_name, jp.args.len()));
                Ok(AdviceOutput::Continue)
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&access).unwrap();
    c.register_self(&cell).unwrap();

    let object = c.get_object(&cell).unwrap();
    object.set_property("size", Value::new(9i32)).unwrap();
    assert_eq!(ready_i32(object.get_property("size").unwrap()), 9);
    assert_eq!(*log.lock(), vec!["Cell.size:1", "Cell.size:0"]);
}

#[test]
fn test_nested_calls_expose_outer_joinpoint() {
    let log: Log = Default::default();
    let house = Class::builder("House")
        .method("visit", |obj, _| obj.invoke("open", vec![]))
        .method("open", |_, _| Ok(Outcome::unit()))
        .build();
    let tracker = {
        let log = log.clone();
        Class::builder("Tracker")
            .aspect()
            .around("House.visit", "mark", |_, _| Ok(AdviceOutput::Continue))
            .before("House.open", "trace", move |_, jp| {
                let prov = jp
                    .prov_joinpoint
                    .as_ref()
                    .map(|p| p.full_name.clone())
                    .unwrap_or_else(|| "-".to_string());
                log.lock().push(format!("{} <- {}", jp.name, prov));
                Ok(AdviceOutput::Continue)
            })
            .build()
    };

    let c = container();
    c.register_self_singleton(&tracker).unwrap();
    c.register_self_singleton(&house).unwrap();

    let object = c.get_object(&house).unwrap();
    object.invoke("visit", vec![]).unwrap();
    object.invoke("open", vec![]).unwrap();

    assert_eq!(*log.lock(), vec!["open <- House.visit", "open <- -"]);
    assert!(object.current_joinpoint().is_none());
}

#[test]
fn test_predefined_logging_aspect() {
    let room = Class::builder("Room")
        .method("enter", |_, _| Ok(Outcome::unit()))
        .build();

    let c = container();
    c.register_self_singleton(&logging_aspect("Room.*")).unwrap();
    c.register_self(&room).unwrap();

    c.invoke(&room, "enter", vec![]).unwrap();
    let advisor = advisor_of(&c).unwrap();
    assert_eq!(advisor.aspects().len(), 1);
    assert!(advisor.registry().has("Room.enter"));
}
