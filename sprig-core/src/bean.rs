use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::emitter::ErrorEmitter;
use crate::error::Result;

/// 类型擦除辅助 trait，用于从 `Arc<dyn Bean>` 还原具体类型
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Bean trait - 所有由容器管理生命周期的组件都需要实现此 trait
///
/// 容器只通过这三个回调和可选的错误发射能力与 Bean 交互，不关心其内部状态。
/// Bean 以 `Arc<dyn Bean>` 的形式共享，因此回调接收 `&self`，
/// 需要修改的状态请使用内部可变性。
#[async_trait::async_trait]
pub trait Bean: AsAny {
    /// 初始化回调
    ///
    /// 可以通过 container 查找其他 Bean，但同一阶段内其他单例未必已经完成 setup。
    async fn setup(&self, container: &Container) -> Result<()>;

    /// 后置初始化回调
    ///
    /// 所有单例都完成 setup 之后调用，适合做跨 Bean 的装配。
    async fn post_setup(&self) -> Result<()>;

    /// 关闭回调
    async fn shutdown(&self);

    /// 可选能力：返回 Some 表示该 Bean 会通过错误发射器上报异步错误
    ///
    /// 容器在 setup 时为其启动转发任务，并在 shutdown 时负责关闭它。
    fn error_emitter(&self) -> Option<&ErrorEmitter> {
        None
    }
}

impl dyn Bean {
    /// 判断 Bean 是否为指定类型
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

type FactoryFn = dyn Fn() -> Arc<dyn Bean> + Send + Sync;

/// Bean 构建器 - 无参工厂，每次调用产生一个 Bean 实例
#[derive(Clone)]
pub struct Builder {
    factory: Arc<FactoryFn>,
    type_name: &'static str,
}

impl Builder {
    /// 用闭包创建构建器，每次 build 都会调用一次闭包
    pub fn new<B, F>(factory: F) -> Self
    where
        B: Bean,
        F: Fn() -> B + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(move || Arc::new(factory()) as Arc<dyn Bean>),
            type_name: std::any::type_name::<B>(),
        }
    }

    /// 静态构建器：始终返回同一个预先创建好的实例
    pub fn of<B: Bean>(bean: Arc<B>) -> Self {
        let bean: Arc<dyn Bean> = bean;
        Self {
            factory: Arc::new(move || Arc::clone(&bean)),
            type_name: std::any::type_name::<B>(),
        }
    }

    /// 调用工厂，产生一个实例
    pub fn build(&self) -> Arc<dyn Bean> {
        (self.factory)()
    }

    /// 构建器产生的 Bean 类型名称
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// 静态构建器的便捷函数，等价于 [`Builder::of`]
pub fn static_builder<B: Bean>(bean: Arc<B>) -> Builder {
    Builder::of(bean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Plain {
        value: usize,
    }

    #[async_trait::async_trait]
    impl Bean for Plain {
        async fn setup(&self, _container: &Container) -> Result<()> {
            Ok(())
        }

        async fn post_setup(&self) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) {}
    }

    #[test]
    fn test_builder_invokes_factory_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let builder = Builder::new(move || Plain {
            value: counter.fetch_add(1, Ordering::SeqCst),
        });

        let first = builder.build();
        let second = builder.build();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.downcast_ref::<Plain>().unwrap().value, 0);
        assert_eq!(second.downcast_ref::<Plain>().unwrap().value, 1);
    }

    #[test]
    fn test_static_builder_returns_same_instance() {
        let builder = static_builder(Arc::new(Plain { value: 12 }));

        let first = builder.build();
        let second = builder.build();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is::<Plain>());
        assert!(builder.type_name().ends_with("Plain"));
    }

    #[test]
    fn test_default_bean_has_no_error_emitter() {
        let bean: Arc<dyn Bean> = Arc::new(Plain { value: 0 });
        assert!(bean.error_emitter().is_none());
    }

    #[test]
    fn test_into_any_arc_downcast() {
        let bean: Arc<dyn Bean> = Arc::new(Plain { value: 7 });
        let plain = bean.into_any_arc().downcast::<Plain>().ok().unwrap();
        assert_eq!(plain.value, 7);
    }
}
