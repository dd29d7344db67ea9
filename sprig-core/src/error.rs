/// Bean 回调使用的统一错误类型
///
/// Bean 的 setup / post_setup 返回 anyhow::Result，容器原样向调用方传递，
/// 可以通过 .context() 添加上下文信息。
pub use anyhow::Result;

use thiserror::Error;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("unknown bean `{0}`")]
    UnknownBean(String),

    #[error("bean `{name}` is not of type `{expected}`")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("invalid bean scope `{0}`")]
    InvalidScope(String),

    #[error("container has already been set up")]
    AlreadySetUp,

    #[error("container has already been shut down")]
    AlreadyShutDown,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    /// Bean 生命周期回调返回的错误，原样透传
    #[error(transparent)]
    Bean(#[from] anyhow::Error),
}

pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_bean_message() {
        let err = ContainerError::UnknownBean("userService".to_string());
        assert_eq!(err.to_string(), "unknown bean `userService`");
    }

    #[test]
    fn test_bean_error_is_transparent() {
        let err: ContainerError = anyhow::anyhow!("database unreachable").into();
        assert_eq!(err.to_string(), "database unreachable");
    }
}
