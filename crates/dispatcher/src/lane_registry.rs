use std::sync::Arc;

use tracing::{debug, info, warn};

use symphonia_core::{
    models::{Address, Lane, LaneCarrier},
    models::lane::EndpointMatch,
    traits::{CarrierScoringService, LaneRepository},
    DispatchError, DispatchResult,
};

/// 线路解析结果：命中的线路及过滤排序后的承运商快照
#[derive(Debug, Clone)]
pub struct ResolvedLane {
    pub lane: Lane,
    /// 启用且评分达标的承运商，按排名升序
    pub carriers: Vec<LaneCarrier>,
    /// 两个端点中较弱的匹配级别
    pub match_quality: EndpointMatch,
}

/// 线路注册表：将运单的收发货地址解析到配置线路
pub struct LaneRegistry {
    lane_repo: Arc<dyn LaneRepository>,
    scoring: Arc<dyn CarrierScoringService>,
}

impl LaneRegistry {
    pub fn new(
        lane_repo: Arc<dyn LaneRepository>,
        scoring: Arc<dyn CarrierScoringService>,
    ) -> Self {
        Self { lane_repo, scoring }
    }

    /// 解析运单的匹配线路
    ///
    /// 匹配优先级确定：邮编前缀 > 城市 > 地理半径；两端都必须命中，
    /// 整体级别取较弱端。同级别时取id最小的线路保证确定性。
    /// 没有线路命中时返回 `NoLaneMatch`，由调用方走人工选线兜底。
    pub async fn resolve_lane(
        &self,
        origin: &Address,
        destination: &Address,
    ) -> DispatchResult<ResolvedLane> {
        let lanes = self.lane_repo.find_active().await?;

        let mut best: Option<(EndpointMatch, Lane)> = None;
        for lane in lanes {
            let Some(origin_match) = lane.origin.match_address(origin) else {
                continue;
            };
            let Some(dest_match) = lane.destination.match_address(destination) else {
                continue;
            };

            let quality = origin_match.max(dest_match);
            debug!(
                "线路 {} 命中: 起点 {:?}, 终点 {:?}",
                lane.name, origin_match, dest_match
            );

            match &best {
                Some((best_quality, _)) if *best_quality <= quality => {}
                _ => best = Some((quality, lane)),
            }
        }

        let Some((match_quality, lane)) = best else {
            debug!(
                "没有线路匹配 {} -> {}",
                origin.summary(),
                destination.summary()
            );
            return Err(DispatchError::NoLaneMatch {
                origin: origin.summary(),
                destination: destination.summary(),
            });
        };

        let carriers = self.filter_eligible_carriers(&lane).await;
        info!(
            "线路解析成功: {} (匹配级别 {:?})，{} 个合格承运商",
            lane.name,
            match_quality,
            carriers.len()
        );

        Ok(ResolvedLane {
            lane,
            carriers,
            match_quality,
        })
    }

    /// 过滤承运商：启用且全局评分不低于线路要求的minScore
    ///
    /// 评分服务不可用时保留该承运商：派单中断的代价高于放进一个
    /// 评分暂不可查的承运商。
    async fn filter_eligible_carriers(&self, lane: &Lane) -> Vec<LaneCarrier> {
        let mut eligible = Vec::new();

        for carrier in lane.active_carriers() {
            match self.scoring.get_global_score(&carrier.carrier_id).await {
                Ok(score) if score >= carrier.min_score => {
                    eligible.push(carrier.clone());
                }
                Ok(score) => {
                    debug!(
                        "承运商 {} 评分 {:.1} 低于线路 {} 要求的 {:.1}，排除",
                        carrier.carrier_id, score, lane.name, carrier.min_score
                    );
                }
                Err(e) => {
                    warn!(
                        "查询承运商 {} 评分失败，保留参与派单: {}",
                        carrier.carrier_id, e
                    );
                    eligible.push(carrier.clone());
                }
            }
        }

        eligible
    }
}
