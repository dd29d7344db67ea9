use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sprig_core::prelude::*;

// ==================== 业务 Bean ====================

/// 数据库连接池 - 单例，会通过错误发射器上报连接故障
struct ConnectionPool {
    url: String,
    open: AtomicBool,
    emitter: ErrorEmitter,
}

impl ConnectionPool {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            open: AtomicBool::new(false),
            emitter: ErrorEmitter::new(),
        }
    }

    fn query(&self, sql: &str) -> Result<String> {
        if !self.open.load(Ordering::SeqCst) {
            bail!("connection pool {} is not open", self.url);
        }
        Ok(format!("rows for `{}`", sql))
    }

    fn report_failure(&self, err: anyhow::Error) {
        self.emitter.fire_error(err.context(format!("pool {}", self.url)));
    }
}

#[async_trait]
impl Bean for ConnectionPool {
    async fn setup(&self, _container: &Container) -> Result<()> {
        tracing::info!("Opening connection pool {}", self.url);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn post_setup(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) {
        self.open.store(false, Ordering::SeqCst);
        tracing::info!("Connection pool {} closed", self.url);
    }

    fn error_emitter(&self) -> Option<&ErrorEmitter> {
        Some(&self.emitter)
    }
}

/// 健康检查 - 单例，post_setup 阶段启动后台检查
#[derive(Default)]
struct HealthMonitor {
    pool: Mutex<Option<Arc<ConnectionPool>>>,
    probe: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[async_trait]
impl Bean for HealthMonitor {
    async fn setup(&self, container: &Container) -> Result<()> {
        let pool = container
            .lookup_as::<ConnectionPool>("connectionPool")
            .context("health monitor needs a connection pool")?;
        *self.pool.lock() = Some(pool);
        Ok(())
    }

    async fn post_setup(&self) -> Result<()> {
        let Some(pool) = self.pool.lock().clone() else {
            bail!("health monitor was not set up");
        };

        // 模拟一次连接故障
        let probe = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            pool.report_failure(anyhow!("connection reset by peer"));
            pool.report_failure(anyhow!("this second failure is never observed"));
        });
        *self.probe.lock() = Some(probe);
        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(probe) = self.probe.lock().take() {
            probe.abort();
        }
        tracing::info!("Health monitor stopped");
    }
}

/// 请求处理器 - 原型，每次 build 都是新实例
struct RequestHandler {
    id: usize,
    pool: Mutex<Option<Arc<ConnectionPool>>>,
}

#[async_trait]
impl Bean for RequestHandler {
    async fn setup(&self, container: &Container) -> Result<()> {
        let pool = container.lookup_as::<ConnectionPool>("connectionPool")?;
        *self.pool.lock() = Some(pool);
        Ok(())
    }

    async fn post_setup(&self) -> Result<()> {
        tracing::debug!("Request handler #{} ready", self.id);
        Ok(())
    }

    async fn shutdown(&self) {}
}

impl RequestHandler {
    fn handle(&self, path: &str) -> Result<String> {
        let pool = self.pool.lock().clone().context("handler was not set up")?;
        let rows = pool.query(&format!("SELECT * FROM {}", path.trim_start_matches('/')))?;
        Ok(format!("handler #{} -> {}", self.id, rows))
    }
}

// ==================== 主程序 ====================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 查找配置文件
    let config_paths = ["demos/app-demo/sprig.toml", "sprig.toml"];
    let config = match config_paths
        .iter()
        .find(|path| std::path::Path::new(path).exists())
    {
        Some(path) => SprigConfig::from_file(path)?,
        None => SprigConfig::default(),
    };

    config.logging.clone().with_env_overrides().init()?;
    tracing::info!("Starting {}", config.container.name);

    let container = Container::with_config(config.container.clone());

    let handler_ids = Arc::new(AtomicUsize::new(0));
    container
        .define(
            "connectionPool",
            Scope::Singleton,
            static_builder(Arc::new(ConnectionPool::new("postgres://localhost/demo"))),
        )
        .define("healthMonitor", Scope::Singleton, Builder::new(HealthMonitor::default))
        .define(
            "requestHandler",
            Scope::Prototype,
            Builder::new(move || RequestHandler {
                id: handler_ids.fetch_add(1, Ordering::SeqCst) + 1,
                pool: Mutex::new(None),
            }),
        );

    container.setup().await?;

    for path in ["/users", "/orders"] {
        let handler = container.build_as::<RequestHandler>("requestHandler").await?;
        println!("{}", handler.handle(path)?);
    }

    // 等待后台检查上报的第一个错误
    let errors = container.error_ch();
    match tokio::time::timeout(Duration::from_secs(2), errors.recv()).await {
        Ok(Some(err)) => println!("container reported: {:#}", err),
        Ok(None) => println!("error channel closed"),
        Err(_) => println!("no errors reported"),
    }

    container.shutdown().await;

    if errors.recv().await.is_none() {
        println!("shutdown complete, error channel closed");
    }

    Ok(())
}
