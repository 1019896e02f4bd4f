//! 测试数据构建器
//!
//! 默认值构成一条可直接派单的里昂-米兰线路，测试只覆盖自己关心的字段。

use chrono::Utc;

use symphonia_core::models::{
    Address, CarrierContact, DispatchChain, DispatchConfig, GeoPoint, Lane, LaneCarrier,
    LaneEndpoint, NotificationChannel, OrderContext,
};

/// 线路承运商构建器
pub struct LaneCarrierBuilder {
    carrier: LaneCarrier,
}

impl LaneCarrierBuilder {
    pub fn new(carrier_id: &str) -> Self {
        Self {
            carrier: LaneCarrier {
                carrier_id: carrier_id.to_string(),
                carrier_name: format!("Carrier {carrier_id}"),
                contact: CarrierContact {
                    email: Some(format!("dispatch@{carrier_id}.example.com")),
                    phone: None,
                },
                price_grid: serde_json::json!({}),
                min_score: 0.0,
                response_delay_minutes: None,
                is_active: true,
                position: 0,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.carrier.carrier_name = name.to_string();
        self
    }

    pub fn with_position(mut self, position: i32) -> Self {
        self.carrier.position = position;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.carrier.min_score = min_score;
        self
    }

    pub fn with_response_delay(mut self, minutes: i64) -> Self {
        self.carrier.response_delay_minutes = Some(minutes);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.carrier.is_active = false;
        self
    }

    pub fn build(self) -> LaneCarrier {
        self.carrier
    }
}

/// 线路构建器，默认里昂(69) -> 米兰(20)，邮件渠道，自动升级开启
pub struct LaneBuilder {
    lane: Lane,
}

impl LaneBuilder {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            lane: Lane {
                id: 0,
                name: name.to_string(),
                origin: LaneEndpoint {
                    city: "Lyon".to_string(),
                    postal_prefix: "69".to_string(),
                    region: None,
                    country: "FR".to_string(),
                    geo: None,
                },
                destination: LaneEndpoint {
                    city: "Milan".to_string(),
                    postal_prefix: "20".to_string(),
                    region: None,
                    country: "IT".to_string(),
                    geo: None,
                },
                carriers: Vec::new(),
                dispatch_config: DispatchConfig {
                    auto_escalate: true,
                    max_attempts: 0,
                    default_response_delay_minutes: 120,
                    channels: vec![NotificationChannel::Email],
                },
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.lane.id = id;
        self
    }

    pub fn with_origin(mut self, city: &str, postal_prefix: &str, country: &str) -> Self {
        self.lane.origin = LaneEndpoint {
            city: city.to_string(),
            postal_prefix: postal_prefix.to_string(),
            region: None,
            country: country.to_string(),
            geo: None,
        };
        self
    }

    pub fn with_destination(mut self, city: &str, postal_prefix: &str, country: &str) -> Self {
        self.lane.destination = LaneEndpoint {
            city: city.to_string(),
            postal_prefix: postal_prefix.to_string(),
            region: None,
            country: country.to_string(),
            geo: None,
        };
        self
    }

    pub fn with_origin_geo(mut self, lat: f64, lng: f64, radius_km: f64) -> Self {
        self.lane.origin.geo = Some(GeoPoint {
            lat,
            lng,
            radius_km: Some(radius_km),
        });
        self
    }

    /// 追加承运商，position按追加顺序自动编号
    pub fn with_carrier(mut self, carrier: LaneCarrier) -> Self {
        let mut carrier = carrier;
        carrier.position = self.lane.carriers.len() as i32;
        self.lane.carriers.push(carrier);
        self
    }

    /// 追加count个默认承运商 carrier-0..carrier-{count-1}
    pub fn with_default_carriers(mut self, count: usize) -> Self {
        for _ in 0..count {
            let next = self.lane.carriers.len();
            let carrier = LaneCarrierBuilder::new(&format!("carrier-{next}")).build();
            self = self.with_carrier(carrier);
        }
        self
    }

    pub fn with_auto_escalate(mut self, auto_escalate: bool) -> Self {
        self.lane.dispatch_config.auto_escalate = auto_escalate;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.lane.dispatch_config.max_attempts = max_attempts;
        self
    }

    pub fn with_default_response_delay(mut self, minutes: i64) -> Self {
        self.lane.dispatch_config.default_response_delay_minutes = minutes;
        self
    }

    pub fn with_channels(mut self, channels: Vec<NotificationChannel>) -> Self {
        self.lane.dispatch_config.channels = channels;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.lane.is_active = false;
        self
    }

    pub fn build(self) -> Lane {
        self.lane
    }
}

/// 运单上下文构建器，默认地址命中LaneBuilder的默认线路
pub struct OrderContextBuilder {
    order: OrderContext,
}

impl OrderContextBuilder {
    pub fn new(order_id: &str) -> Self {
        Self {
            order: OrderContext::new(
                order_id,
                Address::new("Lyon", "69007", "FR"),
                Address::new("Milan", "20121", "IT"),
            ),
        }
    }

    pub fn with_origin(mut self, origin: Address) -> Self {
        self.order.origin = origin;
        self
    }

    pub fn with_destination(mut self, destination: Address) -> Self {
        self.order.destination = destination;
        self
    }

    pub fn with_pallets(mut self, pallet_count: i32, total_weight_kg: f64) -> Self {
        self.order.pallet_count = Some(pallet_count);
        self.order.total_weight_kg = Some(total_weight_kg);
        self
    }

    pub fn build(self) -> OrderContext {
        self.order
    }
}

/// 从默认线路直接构建一条Pending链，绕过LaneRegistry
pub fn pending_chain(order_id: &str, carrier_count: usize, auto_escalate: bool) -> DispatchChain {
    let lane = LaneBuilder::new("test-lane")
        .with_id(1)
        .with_default_carriers(carrier_count)
        .with_auto_escalate(auto_escalate)
        .build();
    let eligible = lane.active_carriers();
    DispatchChain::from_lane(&OrderContextBuilder::new(order_id).build(), &lane, &eligible)
}
