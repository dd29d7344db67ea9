// sprig-core: 轻量的进程内 Bean 容器
//
// 提供：
// - 单例和原型作用域（单例在定义时创建，原型在 build 时创建）
// - 三阶段生命周期（setup / post_setup / shutdown）
// - 异步错误汇聚（每个 Bean 至多上报一个错误，统一转发到容器的错误通道）

pub mod bean;
pub mod config;
pub mod container;
pub mod emitter;
pub mod error;
pub mod logging;
pub mod scope;

// 重新导出常用类型
pub use bean::{static_builder, AsAny, Bean, Builder};
pub use config::{ContainerConfig, SprigConfig};
pub use container::{Container, LifecycleState};
pub use emitter::{ErrorEmitter, ErrorReceiver, Errorer, TryRecvError};
pub use error::{ContainerError, ContainerResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use scope::Scope;

// 导出 async_trait，实现 Bean 时使用
pub use async_trait;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{static_builder, Bean, Builder};
    pub use crate::config::{ContainerConfig, SprigConfig};
    pub use crate::container::{Container, LifecycleState};
    pub use crate::emitter::{ErrorEmitter, ErrorReceiver, Errorer};
    pub use crate::error::{ContainerError, ContainerResult, Result};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::scope::Scope;
    pub use async_trait::async_trait;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, bail, Context};
}
