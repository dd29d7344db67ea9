use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ContainerError;

/// Bean 的作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// 单例模式 - 注册时立即创建，容器中只有一个实例
    Singleton,

    /// 原型模式 - 每次 build 都通过 builder 创建新实例
    Prototype,
}

impl Scope {
    /// 从原始判别值构造作用域（0 = singleton, 1 = prototype）
    ///
    /// # Panics
    ///
    /// 其他任何值都属于调用方的编程错误，没有合理的默认作用域，因此直接 panic。
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Scope::Singleton,
            1 => Scope::Prototype,
            other => panic!("unreachable: invalid bean scope discriminant {}", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Prototype => "prototype",
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Singleton
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(Scope::Singleton),
            "prototype" => Ok(Scope::Prototype),
            _ => Err(ContainerError::InvalidScope(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::Singleton.to_string(), "singleton");
        assert_eq!(Scope::Prototype.to_string(), "prototype");
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("singleton".parse::<Scope>().unwrap(), Scope::Singleton);
        assert_eq!("Prototype".parse::<Scope>().unwrap(), Scope::Prototype);

        let err = "request".parse::<Scope>().unwrap_err();
        assert!(matches!(err, ContainerError::InvalidScope(ref s) if s == "request"));
    }

    #[test]
    fn test_scope_from_u8() {
        assert_eq!(Scope::from_u8(0), Scope::Singleton);
        assert_eq!(Scope::from_u8(1), Scope::Prototype);
    }

    #[test]
    #[should_panic(expected = "invalid bean scope")]
    fn test_invalid_scope_panics() {
        let _ = Scope::from_u8(6);
    }
}
