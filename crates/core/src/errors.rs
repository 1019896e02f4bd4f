use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("派单链没有可用承运商: order_id={order_id}")]
    EmptyChain { order_id: String },
    #[error("过期响应: order_id={order_id}, carrier_id={carrier_id}: {reason}")]
    StaleResponse {
        order_id: String,
        carrier_id: String,
        reason: String,
    },
    #[error("并发前置条件检查失败: order_id={order_id}: {detail}")]
    PreconditionFailed { order_id: String, detail: String },
    #[error("没有匹配的线路: {origin} -> {destination}")]
    NoLaneMatch { origin: String, destination: String },
    #[error("派单链不存在: order_id={order_id}")]
    ChainNotFound { order_id: String },
    #[error("订单已存在派单链: order_id={order_id}")]
    ChainAlreadyExists { order_id: String },
    #[error("线路不存在: id={id}")]
    LaneNotFound { id: i64 },
    #[error("线路配置无效: {0}")]
    InvalidLane(String),
    #[error("数据库操作失败: {0}")]
    DatabaseOperation(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("通知发送失败: {0}")]
    Notification(String),
    #[error("升级网关调用失败: {0}")]
    Escalation(String),
    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn chain_not_found<S: Into<String>>(order_id: S) -> Self {
        Self::ChainNotFound {
            order_id: order_id.into(),
        }
    }
    pub fn empty_chain<S: Into<String>>(order_id: S) -> Self {
        Self::EmptyChain {
            order_id: order_id.into(),
        }
    }
    pub fn stale_response<S: Into<String>>(order_id: S, carrier_id: S, reason: S) -> Self {
        Self::StaleResponse {
            order_id: order_id.into(),
            carrier_id: carrier_id.into(),
            reason: reason.into(),
        }
    }
    pub fn precondition_failed<S: Into<String>>(order_id: S, detail: S) -> Self {
        Self::PreconditionFailed {
            order_id: order_id.into(),
            detail: detail.into(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 致命错误需要人工介入，不应自动重试
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::Internal(_)
                | DispatchError::Configuration(_)
                | DispatchError::InvalidLane(_)
        )
    }

    /// 可重试错误：调用方重新读取链状态后再次尝试即可
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::DatabaseOperation(_)
                | DispatchError::PreconditionFailed { .. }
                | DispatchError::Notification(_)
                | DispatchError::Escalation(_)
        )
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        DispatchError::DatabaseOperation(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}
