use serde::{Deserialize, Serialize};

use super::lane::GeoPoint;

/// 运单的收发货地址，用于线路匹配和升级上下文
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub city: String,
    pub postal_code: String,
    pub region: Option<String>,
    pub country: String,
    pub geo: Option<GeoPoint>,
}

impl Address {
    pub fn new(city: &str, postal_code: &str, country: &str) -> Self {
        Self {
            city: city.to_string(),
            postal_code: postal_code.to_string(),
            region: None,
            country: country.to_string(),
            geo: None,
        }
    }

    pub fn with_geo(mut self, lat: f64, lng: f64) -> Self {
        self.geo = Some(GeoPoint {
            lat,
            lng,
            radius_km: None,
        });
        self
    }

    pub fn summary(&self) -> String {
        format!("{} {} ({})", self.postal_code, self.city, self.country)
    }
}

/// 传递给升级网关的运单上下文
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderContext {
    pub order_id: String,
    pub origin: Address,
    pub destination: Address,
    pub pallet_count: Option<i32>,
    pub total_weight_kg: Option<f64>,
    pub requested_pickup_date: Option<chrono::NaiveDate>,
}

impl OrderContext {
    pub fn new(order_id: &str, origin: Address, destination: Address) -> Self {
        Self {
            order_id: order_id.to_string(),
            origin,
            destination,
            pallet_count: None,
            total_weight_kg: None,
            requested_pickup_date: None,
        }
    }
}
