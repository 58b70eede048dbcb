//! 生命周期动作管线
//!
//! 动作是一棵具名树上的叶子节点，先按声明种类（class / parameter / property /
//! method）分组，class 之下再按阶段（design / runtime / before-constructor /
//! after-constructor）分组。类型工厂在构造实例的各个步骤执行对应的子树。
//!
//! 装饰器注册表决定某个类启用哪些动作：只有当类的某个装饰器登记了该动作名时，
//! 叶子才会执行。新增横切行为只需注册新的动作节点并登记到装饰器上，
//! 构造流程本身无需修改。

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::class::Class;
use crate::constants::*;
use crate::container::Container;
use crate::error::ContainerResult;
use crate::object::Object;
use crate::provider::ExtraProvider;
use crate::token::Token;
use crate::value::Value;

/// 声明种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Class,
    Parameter,
    Property,
    Method,
}

impl DeclarationKind {
    pub fn node_name(self) -> &'static str {
        match self {
            DeclarationKind::Class => CLASS_NODE,
            DeclarationKind::Parameter => PARAMETER_NODE,
            DeclarationKind::Property => PROPERTY_NODE,
            DeclarationKind::Method => METHOD_NODE,
        }
    }
}

/// class 节点下的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Design,
    Runtime,
    BeforeConstructor,
    AfterConstructor,
}

impl Phase {
    pub fn node_name(self) -> &'static str {
        match self {
            Phase::Design => DESIGN_PHASE,
            Phase::Runtime => RUNTIME_PHASE,
            Phase::BeforeConstructor => BEFORE_CONSTRUCTOR_PHASE,
            Phase::AfterConstructor => AFTER_CONSTRUCTOR_PHASE,
        }
    }

    fn all() -> [Phase; 4] {
        [
            Phase::Design,
            Phase::Runtime,
            Phase::BeforeConstructor,
            Phase::AfterConstructor,
        ]
    }
}

/// 动作执行时可见的数据
pub struct ActionContext {
    pub container: Container,
    /// 正在解析的 token
    pub token: Token,
    pub class: Class,
    pub extras: Vec<ExtraProvider>,
    /// 构造参数（名称，已解析的值）
    pub args: Vec<(String, Option<Value>)>,
    /// 构造完成后才有值
    pub instance: Option<Arc<Object>>,
    pub decorators: Vec<String>,
}

impl ActionContext {
    pub fn new(container: Container, token: Token, class: Class) -> Self {
        let decorators = container.metadata().decorators(&class);
        Self {
            container,
            token,
            class,
            extras: Vec::new(),
            args: Vec::new(),
            instance: None,
            decorators,
        }
    }

    pub fn with_extras(mut self, extras: &[ExtraProvider]) -> Self {
        self.extras = extras.to_vec();
        self
    }

    /// 已解析的参数值
    pub fn arg_values(&self) -> Vec<Value> {
        self.args
            .iter()
            .map(|(_, value)| value.clone().unwrap_or_else(Value::unit))
            .collect()
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("token", &self.token)
            .field("class", &self.class.name())
            .field("args", &self.args.len())
            .field("constructed", &self.instance.is_some())
            .finish()
    }
}

/// 生命周期动作
pub trait LifecycleAction: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, ctx: &mut ActionContext) -> ContainerResult<()>;
}

/// 动作树节点
#[derive(Clone)]
pub struct ActionNode {
    name: Cow<'static, str>,
    kind: Option<DeclarationKind>,
    phase: Option<Phase>,
    action: Option<Arc<dyn LifecycleAction>>,
    children: Vec<ActionNode>,
}

/// 查找失败时返回的空节点，执行它什么也不做
static NULL_NODE: ActionNode = ActionNode::null();

impl ActionNode {
    const fn null() -> Self {
        Self {
            name: Cow::Borrowed(""),
            kind: None,
            phase: None,
            action: None,
            children: Vec::new(),
        }
    }

    fn group(name: &'static str, kind: DeclarationKind, phase: Option<Phase>) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind: Some(kind),
            phase,
            action: None,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Option<DeclarationKind> {
        self.kind
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn is_null(&self) -> bool {
        self.name.is_empty() && self.action.is_none() && self.children.is_empty()
    }

    pub fn children(&self) -> &[ActionNode] {
        &self.children
    }

    /// 按名称取子节点，找不到时返回空节点
    pub fn child(&self, name: &str) -> &ActionNode {
        self.children
            .iter()
            .find(|c| c.name == name)
            .unwrap_or(&NULL_NODE)
    }

    /// 按路径查找
    pub fn find(&self, path: &[&str]) -> &ActionNode {
        path.iter().fold(self, |node, name| node.child(name))
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut ActionNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// 追加动作叶子，同名叶子已存在时忽略
    fn add(&mut self, action: Arc<dyn LifecycleAction>) -> bool {
        if self.children.iter().any(|c| c.name == action.name()) {
            return false;
        }
        self.children.push(ActionNode {
            name: Cow::Owned(action.name().to_string()),
            kind: self.kind,
            phase: self.phase,
            action: Some(action),
            children: Vec::new(),
        });
        true
    }

    /// 执行节点
    ///
    /// 给定路径时只下降到该路径指向的节点再执行；否则先执行自身动作，
    /// 再按声明顺序执行所有子节点。
    pub fn execute(
        &self,
        ctx: &mut ActionContext,
        path: &[&str],
        decorators: &DecoratorRegistry,
    ) -> ContainerResult<()> {
        if let Some((first, rest)) = path.split_first() {
            return self.child(first).execute(ctx, rest, decorators);
        }

        if let Some(action) = &self.action {
            if decorators.permits(&ctx.decorators, action.name()) {
                tracing::trace!(
                    "Running lifecycle action '{}' for {}",
                    action.name(),
                    ctx.class.name()
                );
                action.execute(ctx)?;
            }
        }

        for child in &self.children {
            child.execute(ctx, &[], decorators)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ActionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("phase", &self.phase)
            .field("children", &self.children)
            .finish()
    }
}

/// 装饰器 → 启用的动作名（有序）
#[derive(Debug, Clone, Default)]
pub struct DecoratorRegistry {
    entries: HashMap<String, Vec<String>>,
}

impl DecoratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为装饰器启用动作，重复启用无效果
    pub fn enable(&mut self, decorator: impl Into<String>, action: impl Into<String>) {
        let actions = self.entries.entry(decorator.into()).or_default();
        let action = action.into();
        if !actions.contains(&action) {
            actions.push(action);
        }
    }

    pub fn actions(&self, decorator: &str) -> &[String] {
        self.entries
            .get(decorator)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 类的任一装饰器启用了该动作
    pub fn permits(&self, decorators: &[String], action: &str) -> bool {
        decorators
            .iter()
            .any(|d| self.actions(d).iter().any(|a| a == action))
    }
}

/// 完整的动作管线：动作树 + 装饰器注册表
#[derive(Debug, Clone)]
pub struct ActionPipeline {
    root: ActionNode,
    decorators: DecoratorRegistry,
}

impl Default for ActionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionPipeline {
    /// 只有骨架、没有任何动作的管线
    pub fn new() -> Self {
        let mut class = ActionNode::group(CLASS_NODE, DeclarationKind::Class, None);
        for phase in Phase::all() {
            class.children.push(ActionNode::group(
                phase.node_name(),
                DeclarationKind::Class,
                Some(phase),
            ));
        }

        let mut root = ActionNode {
            name: Cow::Borrowed("root"),
            kind: None,
            phase: None,
            action: None,
            children: Vec::new(),
        };
        root.children.push(class);
        for kind in [
            DeclarationKind::Parameter,
            DeclarationKind::Property,
            DeclarationKind::Method,
        ] {
            root.children
                .push(ActionNode::group(kind.node_name(), kind, None));
        }

        Self {
            root,
            decorators: DecoratorRegistry::new(),
        }
    }

    /// 带有核心动作（绑定提供者、解析参数、注入属性）的管线
    pub fn with_core_actions() -> Self {
        use crate::actions::{BindParameterTypeAction, BindProviderAction, InjectPropertyAction};

        let mut pipeline = Self::new();
        pipeline.register(&[CLASS_NODE, DESIGN_PHASE], Arc::new(BindProviderAction));
        pipeline.register(&[PARAMETER_NODE], Arc::new(BindParameterTypeAction));
        pipeline.register(&[PROPERTY_NODE], Arc::new(InjectPropertyAction));
        for action in [BIND_PROVIDER, BIND_PARAMETER_TYPE, INJECT_PROPERTY] {
            pipeline.enable(INJECTABLE, action);
        }
        pipeline
    }

    pub fn root(&self) -> &ActionNode {
        &self.root
    }

    pub fn decorators(&self) -> &DecoratorRegistry {
        &self.decorators
    }

    /// 在 `path` 指向的分组节点下注册动作
    ///
    /// 路径上不存在的节点会被创建，新节点沿用父节点的种类与阶段标记。
    pub fn register(&mut self, path: &[&str], action: Arc<dyn LifecycleAction>) {
        let mut node = &mut self.root;
        for name in path {
            if node.child_mut(name).is_none() {
                let (kind, phase) = (node.kind, node.phase);
                node.children.push(ActionNode {
                    name: Cow::Owned(name.to_string()),
                    kind,
                    phase,
                    action: None,
                    children: Vec::new(),
                });
            }
            node = match node.children.iter_mut().find(|c| c.name == *name) {
                Some(child) => child,
                None => return,
            };
        }
        let name = action.name().to_string();
        if node.add(action) {
            tracing::debug!("Registered lifecycle action '{}' at {}", name, path.join("/"));
        } else {
            tracing::debug!("Lifecycle action '{}' already registered at {}", name, path.join("/"));
        }
    }

    pub fn enable(&mut self, decorator: &str, action: &str) {
        self.decorators.enable(decorator, action);
    }

    /// 执行某个种类下的全部动作，或沿 `path` 执行指定的子树
    pub fn execute(
        &self,
        kind: DeclarationKind,
        ctx: &mut ActionContext,
        path: &[&str],
    ) -> ContainerResult<()> {
        self.root
            .child(kind.node_name())
            .execute(ctx, path, &self.decorators)
    }
}
