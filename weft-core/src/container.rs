use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cache::InstanceCache;
use crate::class::Class;
use crate::config::{ContainerConfig, ResolutionPolicy};
use crate::constants::DESIGN_PHASE;
use crate::error::{CallResult, ContainerError, ContainerResult};
use crate::factory::TypeFactory;
use crate::lifecycle::{ActionContext, ActionPipeline, DeclarationKind, LifecycleAction};
use crate::metadata::{DeclaredMetadata, MetadataLookup};
use crate::object::Object;
use crate::plugin::{ContainerPlugin, PluginRegistry};
use crate::provider::{ExtraProvider, Factory, Provide, ProviderEntry};
use crate::scope::Scope;
use crate::token::{Token, TokenKey};
use crate::utils::dependency::{validate_dependency_graph, CreationTracker, DependencyValidationError};
use crate::value::{Outcome, Value};

/// 依赖注入容器
///
/// `Container` 是一个句柄，克隆后指向同一个容器；不同的 `Container::new()`
/// 彼此独立，没有任何全局状态。
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    config: ContainerConfig,

    metadata: Arc<dyn MetadataLookup>,

    /// token 键 → 绑定
    providers: RwLock<HashMap<TokenKey, ProviderEntry>>,

    /// 单例缓存
    singletons: RwLock<HashMap<TokenKey, Value>>,

    /// 声明了 TTL 的类的实例缓存
    instance_cache: InstanceCache,

    /// 动作管线快照，修改时写时复制
    pipeline: RwLock<Arc<ActionPipeline>>,

    /// 已执行过 design 阶段的类
    designed: Mutex<HashSet<u64>>,

    /// 循环依赖检测
    creation_tracker: CreationTracker,

    /// 已安装的插件名
    plugins: RwLock<Vec<String>>,
}

impl Container {
    /// 使用默认配置创建容器
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self::from_parts(config, Arc::new(DeclaredMetadata))
    }

    fn from_parts(config: ContainerConfig, metadata: Arc<dyn MetadataLookup>) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                config,
                metadata,
                providers: RwLock::new(HashMap::new()),
                singletons: RwLock::new(HashMap::new()),
                instance_cache: InstanceCache::new(),
                pipeline: RwLock::new(Arc::new(ActionPipeline::with_core_actions())),
                designed: Mutex::new(HashSet::new()),
                creation_tracker: CreationTracker::new(),
                plugins: RwLock::new(Vec::new()),
            }),
        }
    }

    /// 构建器模式创建容器
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub fn metadata(&self) -> &dyn MetadataLookup {
        &*self.inner.metadata
    }

    // ========== 注册 ==========

    /// 绑定 token
    ///
    /// 同一个键重复注册时保留第一次的绑定（记录日志，不报错）。
    /// 类的作用域取自其声明，未声明时为瞬态。
    pub fn register(&self, token: impl Into<Token>, provide: impl Into<Provide>) -> ContainerResult<()> {
        let provide = provide.into();
        let singleton = match &provide {
            Provide::Class(class) => self.metadata().scope(class) == Some(Scope::Singleton),
            _ => false,
        };
        self.insert(token.into(), provide, singleton, false).map(|_| ())
    }

    /// 以单例方式绑定 token
    pub fn register_singleton(
        &self,
        token: impl Into<Token>,
        provide: impl Into<Provide>,
    ) -> ContainerResult<()> {
        self.insert(token.into(), provide.into(), true, false)
            .map(|_| ())
    }

    /// 以类自身作为 token 注册
    ///
    /// 作用域取自类的声明，未声明时使用配置的默认作用域。
    pub fn register_self(&self, class: &Class) -> ContainerResult<()> {
        let scope = self
            .metadata()
            .scope(class)
            .unwrap_or(self.inner.config.default_scope);
        self.insert(
            Token::Class(class.clone()),
            Provide::Class(class.clone()),
            scope.is_singleton(),
            false,
        )
        .map(|_| ())
    }

    pub fn register_self_singleton(&self, class: &Class) -> ContainerResult<()> {
        self.register_singleton(class, class)
    }

    /// 不提供实现的注册：token 必须本身是类
    pub fn register_token(&self, token: impl Into<Token>) -> ContainerResult<()> {
        let token = token.into();
        match token.as_class() {
            Some(class) => self.register_self(class),
            None => Err(ContainerError::InvalidRegistration {
                token: token.to_string(),
                reason: "a provider is required for tokens that are not classes".to_string(),
            }),
        }
    }

    /// 严格注册：键已存在时返回 `DuplicateRegistrationKey`
    pub fn try_register(&self, token: impl Into<Token>, provide: impl Into<Provide>) -> ContainerResult<()> {
        let provide = provide.into();
        let singleton = match &provide {
            Provide::Class(class) => self.metadata().scope(class) == Some(Scope::Singleton),
            _ => false,
        };
        self.insert(token.into(), provide, singleton, true).map(|_| ())
    }

    /// 把抽象 token 绑定到具体实现（另一个 token 或工厂）
    pub fn bind_provider(&self, provide_key: impl Into<Token>, provide: Provide) -> ContainerResult<()> {
        self.insert(provide_key.into(), provide, false, false)
            .map(|_| ())
    }

    /// 插入绑定，返回是否真正插入
    fn insert(&self, token: Token, provide: Provide, singleton: bool, strict: bool) -> ContainerResult<bool> {
        let key = token.key();
        if self.inner.providers.read().contains_key(&key) {
            return self.reject_duplicate(&token, strict);
        }

        let (factory, impl_class) = match provide {
            Provide::Class(class) => {
                self.design(&token, &class)?;
                let factory = TypeFactory::new(token.clone(), class.clone(), singleton);
                (Factory::Type(Arc::new(factory)), Some(class))
            }
            Provide::Factory(f) => (Factory::Custom(f), None),
            Provide::Value(value) => (Factory::Value(value), None),
            Provide::Alias(target) => {
                let impl_class = self.get_token_impl(target.clone());
                (Factory::Alias(target), impl_class)
            }
        };

        let entry = ProviderEntry {
            provide: token.clone(),
            factory,
            impl_class,
            singleton,
        };

        let mut providers = self.inner.providers.write();
        match providers.entry(key) {
            Entry::Occupied(_) => self.reject_duplicate(&token, strict),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    "Registered {} ({}, singleton: {})",
                    token,
                    entry.factory.describe(),
                    singleton
                );
                slot.insert(entry);
                Ok(true)
            }
        }
    }

    fn reject_duplicate(&self, token: &Token, strict: bool) -> ContainerResult<bool> {
        if strict {
            return Err(ContainerError::DuplicateRegistrationKey(token.to_string()));
        }
        tracing::debug!(
            "Token {} is already registered, keeping the first registration",
            token
        );
        Ok(false)
    }

    /// 每个类只成功执行一次 design 阶段动作
    ///
    /// 执行期间类已被标记，避免提供者声明互相引用时重入；失败时撤销标记。
    fn design(&self, token: &Token, class: &Class) -> ContainerResult<()> {
        if !self.inner.designed.lock().insert(class.id()) {
            return Ok(());
        }
        let pipeline = self.pipeline();
        let mut ctx = ActionContext::new(self.clone(), token.clone(), class.clone());
        let result = pipeline.execute(DeclarationKind::Class, &mut ctx, &[DESIGN_PHASE]);
        if result.is_err() {
            self.inner.designed.lock().remove(&class.id());
        }
        result
    }

    /// 移除绑定和对应的缓存条目，已经持有实例的调用方不受影响
    pub fn unregister(&self, token: impl Into<Token>) -> bool {
        let token = token.into();
        let key = token.key();
        let removed = self.inner.providers.write().remove(&key);
        self.inner.singletons.write().remove(&key);

        match removed {
            Some(entry) => {
                if let Factory::Type(factory) = &entry.factory {
                    self.inner.instance_cache.remove(factory.class().id());
                }
                tracing::debug!("Unregistered {}", token);
                true
            }
            None => false,
        }
    }

    pub fn has(&self, token: impl Into<Token>) -> bool {
        self.inner.providers.read().contains_key(&token.into().key())
    }

    /// 当前的绑定（诊断用）
    pub fn entry(&self, token: impl Into<Token>) -> Option<ProviderEntry> {
        self.inner.providers.read().get(&token.into().key()).cloned()
    }

    /// 所有已注册的键，排序后返回
    pub fn registered_keys(&self) -> Vec<TokenKey> {
        let mut keys: Vec<TokenKey> = self.inner.providers.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    // ========== 解析 ==========

    /// 解析 token
    ///
    /// 未注册时：严格模式返回 `UnregisteredToken`，宽松模式记录警告并返回 `Ok(None)`。
    pub fn get(&self, token: impl Into<Token>) -> ContainerResult<Option<Value>> {
        self.resolve(token, &[])
    }

    /// 带额外提供者解析 token
    pub fn resolve(&self, token: impl Into<Token>, extras: &[ExtraProvider]) -> ContainerResult<Option<Value>> {
        let token = token.into();
        let key = token.key();
        let entry = self.inner.providers.read().get(&key).cloned();

        let Some(entry) = entry else {
            return self.unregistered(&token);
        };

        tracing::trace!("Resolving {} via {} factory", token, entry.factory.describe());
        self.produce(&token, &key, &entry, extras)
    }

    fn unregistered(&self, token: &Token) -> ContainerResult<Option<Value>> {
        match self.inner.config.resolution {
            ResolutionPolicy::Strict => Err(ContainerError::UnregisteredToken(token.to_string())),
            ResolutionPolicy::Lenient => {
                tracing::warn!("No provider registered for token '{}', resolving to nothing", token);
                Ok(None)
            }
        }
    }

    fn produce(
        &self,
        token: &Token,
        key: &TokenKey,
        entry: &ProviderEntry,
        extras: &[ExtraProvider],
    ) -> ContainerResult<Option<Value>> {
        match &entry.factory {
            Factory::Value(value) => Ok(Some(value.clone())),
            Factory::Type(factory) => factory.create(self, extras).map(Some),
            Factory::Custom(f) => {
                if entry.singleton {
                    if let Some(instance) = self.cached_singleton(key) {
                        return Ok(Some(instance));
                    }
                }
                let _guard = self
                    .inner
                    .creation_tracker
                    .enter(key.as_str(), &token.to_string())?;
                let value = f(self, extras).map_err(ContainerError::from_user)?;
                Ok(Some(self.finish(key, entry, value)))
            }
            Factory::Alias(target) => {
                if entry.singleton {
                    if let Some(instance) = self.cached_singleton(key) {
                        return Ok(Some(instance));
                    }
                }
                let _guard = self
                    .inner
                    .creation_tracker
                    .enter(key.as_str(), &token.to_string())?;
                let resolved = self.resolve(target.clone(), extras)?;
                Ok(resolved.map(|value| self.finish(key, entry, value)))
            }
        }
    }

    fn finish(&self, key: &TokenKey, entry: &ProviderEntry, value: Value) -> Value {
        if entry.singleton {
            self.store_singleton(key, value)
        } else {
            value
        }
    }

    /// 解析为容器构造的实例
    pub fn get_object(&self, token: impl Into<Token>) -> ContainerResult<Arc<Object>> {
        let token = token.into();
        let value = self
            .get(token.clone())?
            .ok_or_else(|| ContainerError::UnregisteredToken(token.to_string()))?;
        value.as_object().ok_or_else(|| ContainerError::TypeMismatch {
            expected: "object".to_string(),
            found: value.type_name().to_string(),
        })
    }

    /// 解析并向下转型为具体类型
    pub fn get_value<T: Any + Send + Sync>(&self, token: impl Into<Token>) -> ContainerResult<Arc<T>> {
        let token = token.into();
        let value = self
            .get(token.clone())?
            .ok_or_else(|| ContainerError::UnregisteredToken(token.to_string()))?;
        value.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            found: value.type_name().to_string(),
        })
    }

    /// 解析实例并调用其方法
    pub fn invoke(&self, token: impl Into<Token>, method: &str, args: Vec<Value>) -> CallResult<Outcome> {
        let object = self.get_object(token)?;
        object.invoke(method, args)
    }

    /// 沿别名链找到最终支撑 token 的具体类
    pub fn get_token_impl(&self, token: impl Into<Token>) -> Option<Class> {
        let mut current = token.into();
        let mut seen = HashSet::new();
        loop {
            let key = current.key();
            if !seen.insert(key.clone()) {
                tracing::warn!("Alias chain of {} loops back on itself", current);
                return None;
            }
            let entry = self.inner.providers.read().get(&key).cloned();
            match entry {
                None => return current.as_class().cloned(),
                Some(entry) => match entry.factory {
                    Factory::Type(factory) => return Some(factory.class().clone()),
                    Factory::Alias(target) => current = target,
                    _ => return entry.impl_class,
                },
            }
        }
    }

    /// 检查所有类型绑定的依赖图：缺失的依赖与构造环
    pub fn validate(&self) -> ContainerResult<()> {
        let entries: Vec<(TokenKey, ProviderEntry)> = self
            .inner
            .providers
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();

        let mut names: HashMap<String, String> = HashMap::new();
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();

        for (key, entry) in &entries {
            names.insert(key.to_string(), entry.provide.to_string());
            let mut deps = Vec::new();
            match &entry.factory {
                Factory::Type(factory) => {
                    let class = factory.class();
                    let tokens = self
                        .metadata()
                        .parameters(class)
                        .into_iter()
                        .filter_map(|p| p.token)
                        .chain(self.metadata().properties(class).into_iter().map(|p| p.token));
                    for token in tokens {
                        names.entry(token.key().to_string()).or_insert_with(|| token.to_string());
                        deps.push(token.key().to_string());
                    }
                }
                Factory::Alias(target) => {
                    names.entry(target.key().to_string()).or_insert_with(|| target.to_string());
                    deps.push(target.key().to_string());
                }
                Factory::Custom(_) | Factory::Value(_) => {}
            }
            graph.insert(key.to_string(), deps);
        }

        let display = |key: &String| names.get(key).cloned().unwrap_or_else(|| key.clone());
        match validate_dependency_graph(&graph) {
            Ok(()) => {
                tracing::info!("Dependency validation passed for {} binding(s)", graph.len());
                Ok(())
            }
            Err(DependencyValidationError::MissingDependency { dependent, missing }) => {
                tracing::warn!("{} depends on unregistered {}", display(&dependent), display(&missing));
                Err(ContainerError::UnregisteredToken(display(&missing)))
            }
            Err(DependencyValidationError::CircularDependency { cycle }) => {
                Err(ContainerError::CircularDependency {
                    chain: cycle.iter().map(display).collect(),
                })
            }
        }
    }

    // ========== 管线与插件 ==========

    /// 当前动作管线的快照
    pub fn pipeline(&self) -> Arc<ActionPipeline> {
        Arc::clone(&self.inner.pipeline.read())
    }

    /// 在 `path` 下注册生命周期动作
    pub fn register_action(&self, path: &[&str], action: Arc<dyn LifecycleAction>) {
        let mut pipeline = self.inner.pipeline.write();
        Arc::make_mut(&mut pipeline).register(path, action);
    }

    /// 为装饰器启用动作
    pub fn enable_action(&self, decorator: &str, action: &str) {
        let mut pipeline = self.inner.pipeline.write();
        Arc::make_mut(&mut pipeline).enable(decorator, action);
    }

    /// 安装插件，同名插件只安装一次
    ///
    /// 插件注册的 design 阶段动作只对之后注册的类生效。
    pub fn use_plugin(&self, plugin: &dyn ContainerPlugin) -> ContainerResult<bool> {
        let name = plugin.name().to_string();
        if self.inner.plugins.read().contains(&name) {
            tracing::debug!("Plugin {} is already installed", name);
            return Ok(false);
        }
        tracing::info!("Installing plugin: {}", name);
        plugin.install(self)?;
        self.inner.plugins.write().push(name);
        Ok(true)
    }

    pub fn installed_plugins(&self) -> Vec<String> {
        self.inner.plugins.read().clone()
    }

    // ========== 缓存 ==========

    pub(crate) fn cached_singleton(&self, key: &TokenKey) -> Option<Value> {
        self.inner.singletons.read().get(key).cloned()
    }

    /// 写入单例缓存；并发构造时保留先写入的实例
    pub(crate) fn store_singleton(&self, key: &TokenKey, value: Value) -> Value {
        self.inner
            .singletons
            .write()
            .entry(key.clone())
            .or_insert(value)
            .clone()
    }

    pub fn instance_cache(&self) -> &InstanceCache {
        &self.inner.instance_cache
    }

    pub(crate) fn creation_tracker(&self) -> &CreationTracker {
        &self.inner.creation_tracker
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("resolution", &self.inner.config.resolution)
            .field("providers", &self.inner.providers.read().len())
            .field("singletons", &self.inner.singletons.read().len())
            .field("plugins", &*self.inner.plugins.read())
            .finish()
    }
}

/// 容器构建器
pub struct ContainerBuilder {
    config: ContainerConfig,
    metadata: Arc<dyn MetadataLookup>,
    plugins: PluginRegistry,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            metadata: Arc::new(DeclaredMetadata),
            plugins: PluginRegistry::new(),
        }
    }

    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resolution(mut self, resolution: ResolutionPolicy) -> Self {
        self.config.resolution = resolution;
        self
    }

    pub fn default_scope(mut self, scope: Scope) -> Self {
        self.config.default_scope = scope;
        self
    }

    /// 替换元数据来源
    pub fn metadata(mut self, metadata: impl MetadataLookup + 'static) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    pub fn plugin(mut self, plugin: impl ContainerPlugin + 'static) -> Self {
        self.plugins.register(Arc::new(plugin));
        self
    }

    /// 构建容器并按优先级安装插件；配置了日志时顺便初始化日志
    pub fn build(mut self) -> ContainerResult<Container> {
        if let Some(logging) = self.config.logging.clone() {
            if let Err(e) = logging.init() {
                // 全局订阅者只能设置一次，重复初始化不影响容器
                tracing::debug!("Logging not initialized: {}", e);
            }
        }

        let container = Container::from_parts(self.config, self.metadata);
        self.plugins.install_all(&container)?;
        Ok(container)
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
