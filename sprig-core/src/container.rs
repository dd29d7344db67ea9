use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinSet;

use crate::bean::{Bean, Builder};
use crate::config::ContainerConfig;
use crate::emitter::{ErrorEmitter, ErrorReceiver, Errorer};
use crate::error::{ContainerError, ContainerResult};
use crate::Scope;

/// 容器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// 已创建，尚未 setup
    Created,
    /// 已执行过 setup（无论成功与否）
    SetUp,
    /// 已关闭
    ShutDown,
}

/// Bean 注册表，单例和原型分开存放
///
/// 同一个名称同一时间只会出现在其中一个 map 中。
#[derive(Default)]
struct Registry {
    singletons: HashMap<String, Arc<dyn Bean>>,
    prototypes: HashMap<String, Builder>,
}

/// 依赖注入容器
///
/// 持有单例实例和原型构建器，负责对所有单例执行 setup / post_setup / shutdown，
/// 并把各个 Bean 的异步错误汇聚到容器自己的错误通道中。
///
/// `setup`、`build`、`shutdown` 会在 tokio 运行时中启动后台任务，需要在运行时内调用。
pub struct Container {
    config: ContainerConfig,

    /// 注册表，define 走写锁，lookup / build 走读锁
    registry: RwLock<Registry>,

    /// 容器自身对外的错误通道
    emitter: Arc<ErrorEmitter>,

    /// 错误转发任务和 shutdown 任务
    tasks: Mutex<JoinSet<()>>,

    state: Mutex<LifecycleState>,
}

impl Container {
    /// 创建新的空容器（使用默认配置）
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// 使用指定配置创建新的空容器
    pub fn with_config(config: ContainerConfig) -> Self {
        tracing::debug!(container = %config.name, "Creating container");
        Self {
            config,
            registry: RwLock::new(Registry::default()),
            emitter: Arc::new(ErrorEmitter::new()),
            tasks: Mutex::new(JoinSet::new()),
            state: Mutex::new(LifecycleState::Created),
        }
    }

    /// 容器名称
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 当前生命周期状态
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// 定义 Bean
    ///
    /// 单例会立即调用 builder 创建实例；原型只保存 builder，等到 `build` 时再调用。
    /// 同名定义以最后一次为准，并且会从另一种作用域中移除该名称。
    pub fn define(&self, name: impl Into<String>, scope: Scope, builder: Builder) -> &Self {
        let name = name.into();

        // builder 在锁外调用，允许其内部访问容器
        let instance = match scope {
            Scope::Singleton => Some(builder.build()),
            Scope::Prototype => None,
        };

        let (replaced, shadowed) = {
            let mut registry = self.registry.write();
            match instance {
                Some(bean) => (
                    registry.singletons.insert(name.clone(), bean).is_some(),
                    registry.prototypes.remove(&name).is_some(),
                ),
                None => (
                    registry
                        .prototypes
                        .insert(name.clone(), builder.clone())
                        .is_some(),
                    registry.singletons.remove(&name).is_some(),
                ),
            }
        };

        if shadowed && self.config.warn_on_redefine {
            tracing::warn!(
                container = %self.config.name,
                bean = %name,
                %scope,
                "Bean redefined, previous definition in the other scope removed"
            );
        } else if replaced && self.config.warn_on_redefine {
            tracing::warn!(
                container = %self.config.name,
                bean = %name,
                %scope,
                "Bean redefined, previous definition replaced"
            );
        }

        if scope == Scope::Singleton && self.state() != LifecycleState::Created {
            tracing::warn!(
                container = %self.config.name,
                bean = %name,
                "Singleton defined after setup, its lifecycle callbacks will not run"
            );
        }

        tracing::debug!(
            container = %self.config.name,
            bean = %name,
            %scope,
            type_name = builder.type_name(),
            "Bean definition registered"
        );
        self
    }

    /// 获取单例 Bean
    pub fn lookup(&self, name: &str) -> ContainerResult<Arc<dyn Bean>> {
        tracing::trace!(container = %self.config.name, bean = name, "Looking up singleton");

        let registry = self.registry.read();
        registry.singletons.get(name).cloned().ok_or_else(|| {
            tracing::debug!(container = %self.config.name, bean = name, "Singleton not found");
            ContainerError::UnknownBean(name.to_string())
        })
    }

    /// 获取单例 Bean 并转换为具体类型
    pub fn lookup_as<T: Bean>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let bean = self.lookup(name)?;
        downcast_bean(name, bean)
    }

    /// 构建新的原型 Bean，并依次调用 setup 和 post_setup
    ///
    /// 任一回调失败时实例被丢弃，错误原样返回。容器不跟踪返回的实例。
    pub async fn build(&self, name: &str) -> ContainerResult<Arc<dyn Bean>> {
        let builder = {
            let registry = self.registry.read();
            registry.prototypes.get(name).cloned()
        };

        let builder = builder.ok_or_else(|| {
            tracing::debug!(container = %self.config.name, bean = name, "Prototype not found");
            ContainerError::UnknownBean(name.to_string())
        })?;

        tracing::debug!(container = %self.config.name, bean = name, "Creating prototype instance");
        let bean = builder.build();

        if let Err(e) = bean.setup(self).await {
            tracing::warn!(container = %self.config.name, bean = name, "Prototype setup failed: {}", e);
            return Err(e.into());
        }

        if let Err(e) = bean.post_setup().await {
            tracing::warn!(container = %self.config.name, bean = name, "Prototype post-setup failed: {}", e);
            return Err(e.into());
        }

        Ok(bean)
    }

    /// 构建原型 Bean 并转换为具体类型
    pub async fn build_as<T: Bean>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let bean = self.build(name).await?;
        downcast_bean(name, bean)
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.registry.read().singletons.contains_key(name)
    }

    pub fn contains_prototype(&self, name: &str) -> bool {
        self.registry.read().prototypes.contains_key(name)
    }

    /// 所有已定义的 Bean 名称（排序后）
    pub fn bean_names(&self) -> Vec<String> {
        let registry = self.registry.read();
        let mut names: Vec<String> = registry
            .singletons
            .keys()
            .chain(registry.prototypes.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn singleton_count(&self) -> usize {
        self.registry.read().singletons.len()
    }

    pub fn prototype_count(&self) -> usize {
        self.registry.read().prototypes.len()
    }

    /// 初始化所有单例
    ///
    /// 1. 为每个带错误发射器的单例启动错误转发任务
    /// 2. 依次调用所有单例的 setup
    /// 3. 依次调用所有单例的 post_setup
    ///
    /// 遇到第一个错误立即返回，不回滚。只能调用一次。
    /// 期间若容器被 shutdown（例如某个 Bean 在 setup 中调用了 shutdown），
    /// 不再继续调用剩余的回调，返回 `AlreadyShutDown`。
    pub async fn setup(&self) -> ContainerResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                LifecycleState::Created => *state = LifecycleState::SetUp,
                LifecycleState::SetUp => return Err(ContainerError::AlreadySetUp),
                LifecycleState::ShutDown => return Err(ContainerError::AlreadyShutDown),
            }
        }

        let singletons = self.singleton_snapshot();
        tracing::info!(
            container = %self.config.name,
            "Setting up {} singleton bean(s)",
            singletons.len()
        );

        self.start_error_relays(&singletons)?;

        for (name, bean) in &singletons {
            self.ensure_running()?;
            tracing::trace!(container = %self.config.name, bean = %name, "Running setup");
            if let Err(e) = bean.setup(self).await {
                tracing::warn!(container = %self.config.name, bean = %name, "Singleton setup failed: {}", e);
                return Err(e.into());
            }
        }

        for (name, bean) in &singletons {
            self.ensure_running()?;
            tracing::trace!(container = %self.config.name, bean = %name, "Running post-setup");
            if let Err(e) = bean.post_setup().await {
                tracing::warn!(container = %self.config.name, bean = %name, "Singleton post-setup failed: {}", e);
                return Err(e.into());
            }
        }

        tracing::info!(container = %self.config.name, "Container setup complete");
        Ok(())
    }

    /// 关闭容器
    ///
    /// 并发关闭所有单例：每个 Bean 先关闭其错误发射器，再调用 shutdown。
    /// 等待所有关闭任务和错误转发任务结束后，关闭容器自身的错误通道。
    /// 原型实例由调用方负责，不会被关闭。重复调用无效果。
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::ShutDown {
                tracing::debug!(container = %self.config.name, "Container already shut down");
                return;
            }
            *state = LifecycleState::ShutDown;
        }

        let singletons = self.singleton_snapshot();
        tracing::info!(
            container = %self.config.name,
            "Shutting down {} singleton bean(s)",
            singletons.len()
        );

        let mut tasks = std::mem::take(&mut *self.tasks.lock());

        for (name, bean) in singletons {
            let container = self.config.name.clone();
            tasks.spawn(async move {
                if let Some(emitter) = bean.error_emitter() {
                    emitter.close();
                }
                bean.shutdown().await;
                tracing::debug!(container = %container, bean = %name, "Bean shut down");
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(
                    container = %self.config.name,
                    "Background task failed during shutdown: {}",
                    e
                );
            }
        }

        self.emitter.close();
        tracing::info!(container = %self.config.name, "Container shutdown complete");
    }

    /// 向容器自身的错误通道发送错误（至多投递一次）
    pub fn fire_error(&self, err: impl Into<anyhow::Error>) {
        self.emitter.fire_error(err);
    }

    fn singleton_snapshot(&self) -> Vec<(String, Arc<dyn Bean>)> {
        let registry = self.registry.read();
        registry
            .singletons
            .iter()
            .map(|(name, bean)| (name.clone(), Arc::clone(bean)))
            .collect()
    }

    /// setup 过程中检查容器是否已被关闭
    fn ensure_running(&self) -> ContainerResult<()> {
        if self.state() == LifecycleState::ShutDown {
            tracing::warn!(container = %self.config.name, "Container shut down during setup, aborting");
            return Err(ContainerError::AlreadyShutDown);
        }
        Ok(())
    }

    fn start_error_relays(&self, singletons: &[(String, Arc<dyn Bean>)]) -> ContainerResult<()> {
        // 持有 tasks 锁时检查状态：shutdown 先置状态再取走 tasks，
        // 这里看到的若不是 ShutDown，新任务一定会被那次 shutdown 等待
        let mut tasks = self.tasks.lock();
        self.ensure_running()?;

        for (name, bean) in singletons {
            let Some(emitter) = bean.error_emitter() else {
                continue;
            };

            let source = emitter.error_ch();
            let sink = Arc::clone(&self.emitter);
            let bean_name = name.clone();
            let container = self.config.name.clone();

            tasks.spawn(async move {
                while let Some(err) = source.recv().await {
                    tracing::debug!(container = %container, bean = %bean_name, "Relaying error: {}", err);
                    sink.fire_error(err);
                }
                tracing::trace!(container = %container, bean = %bean_name, "Error relay finished");
            });

            tracing::debug!(container = %self.config.name, bean = %name, "Started error relay");
        }
        Ok(())
    }
}

impl Errorer for Container {
    fn error_ch(&self) -> ErrorReceiver {
        self.emitter.error_ch()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("Container")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("singletons", &registry.singletons.len())
            .field("prototypes", &registry.prototypes.len())
            .finish()
    }
}

fn downcast_bean<T: Bean>(name: &str, bean: Arc<dyn Bean>) -> ContainerResult<Arc<T>> {
    bean.into_any_arc()
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
}
