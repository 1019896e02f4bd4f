use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;
use crate::DispatchResult;

use super::order::Address;

/// 地理坐标点，线路端点上可携带匹配半径
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
}

impl GeoPoint {
    /// Haversine 球面距离（公里）
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }
}

/// 线路端点描述：城市、邮编前缀、区域，可选坐标+半径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneEndpoint {
    pub city: String,
    pub postal_prefix: String,
    pub region: Option<String>,
    pub country: String,
    pub geo: Option<GeoPoint>,
}

/// 端点匹配级别，数值越小优先级越高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EndpointMatch {
    PostalPrefix = 0,
    City = 1,
    GeoRadius = 2,
}

impl LaneEndpoint {
    /// 将运单地址与端点匹配，返回命中的匹配级别
    ///
    /// 匹配优先级：邮编前缀 > 城市 > 地理半径。国家不一致时直接不命中。
    pub fn match_address(&self, address: &Address) -> Option<EndpointMatch> {
        if !self.country.eq_ignore_ascii_case(&address.country) {
            return None;
        }

        if !self.postal_prefix.is_empty() && address.postal_code.starts_with(&self.postal_prefix) {
            return Some(EndpointMatch::PostalPrefix);
        }

        if !self.city.is_empty() && self.city.eq_ignore_ascii_case(&address.city) {
            return Some(EndpointMatch::City);
        }

        if let (Some(lane_geo), Some(addr_geo)) = (&self.geo, &address.geo) {
            if let Some(radius_km) = lane_geo.radius_km {
                if lane_geo.distance_km(addr_geo) <= radius_km {
                    return Some(EndpointMatch::GeoRadius);
                }
            }
        }

        None
    }
}

/// 通知渠道
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationChannel {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "sms")]
    Sms,
    #[serde(rename = "portal")]
    Portal,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::Email => write!(f, "email"),
            NotificationChannel::Sms => write!(f, "sms"),
            NotificationChannel::Portal => write!(f, "portal"),
        }
    }
}

/// 承运商联系方式
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CarrierContact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// 线路上的一个排名承运商
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneCarrier {
    pub carrier_id: String,
    pub carrier_name: String,
    pub contact: CarrierContact,
    /// 价格表，结构由报价服务约定
    pub price_grid: serde_json::Value,
    /// 低于该全局评分的承运商不参与派单
    pub min_score: f64,
    /// 响应窗口（分钟），缺省时使用线路默认值
    pub response_delay_minutes: Option<i64>,
    pub is_active: bool,
    /// 在线路内的排名，0为最高优先级
    pub position: i32,
}

/// 线路级派单配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 承运商列表用尽后是否自动升级到外部市场
    pub auto_escalate: bool,
    /// 最多发起的报价轮次，0表示不限制
    pub max_attempts: i32,
    pub default_response_delay_minutes: i64,
    pub channels: Vec<NotificationChannel>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            auto_escalate: true,
            max_attempts: 0,
            default_response_delay_minutes: 120,
            channels: vec![NotificationChannel::Email, NotificationChannel::Portal],
        }
    }
}

/// 线路：一条配置好的收发货路线及其排名承运商列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lane {
    pub id: i64,
    pub name: String,
    pub origin: LaneEndpoint,
    pub destination: LaneEndpoint,
    pub carriers: Vec<LaneCarrier>,
    pub dispatch_config: DispatchConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lane {
    /// 校验线路配置：承运商position必须从0开始、唯一且连续
    pub fn validate(&self) -> DispatchResult<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::InvalidLane("线路名称不能为空".to_string()));
        }
        if self.dispatch_config.default_response_delay_minutes <= 0 {
            return Err(DispatchError::InvalidLane(
                "默认响应窗口必须为正数".to_string(),
            ));
        }

        let mut positions: Vec<i32> = self.carriers.iter().map(|c| c.position).collect();
        positions.sort_unstable();
        for (expected, actual) in positions.iter().enumerate() {
            if *actual != expected as i32 {
                return Err(DispatchError::InvalidLane(format!(
                    "线路 {} 的承运商排名不连续: 期望 {}, 实际 {}",
                    self.name, expected, actual
                )));
            }
        }

        Ok(())
    }

    /// 按排名升序返回启用的承运商
    pub fn active_carriers(&self) -> Vec<&LaneCarrier> {
        let mut carriers: Vec<&LaneCarrier> =
            self.carriers.iter().filter(|c| c.is_active).collect();
        carriers.sort_by_key(|c| c.position);
        carriers
    }

    pub fn response_delay_for(&self, carrier: &LaneCarrier) -> i64 {
        carrier
            .response_delay_minutes
            .unwrap_or(self.dispatch_config.default_response_delay_minutes)
    }
}
