// ==========================================
// 仓库波次排程引擎 - 工时模型 (Time Model)
// ==========================================
// 职责: 将库位几何与单件作业工时换算为阶段时长（分钟）
// 输入: 订单行 + SKU 工时 + 库位位置 + 行走参数（显式传入）
// 输出: 拣货/打包时长、拣货路径与行走时间
// 口径: 拣货工时按件计，打包工时按订单行计
// ==========================================
// 保证: 确定性、非负、对数量与距离单调
// 路径策略: 最近邻（起点为排序键最小的库位，距离相同按排序键）
// ==========================================

use crate::config::engine_config::WalkingTimeConfig;
use crate::domain::order::{Order, OrderLine};
use crate::domain::sku::{BinLocation, SkuRate};
use crate::domain::types::Stage;
use crate::engine::error::{EngineResult, WaveEngineError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// PickRoute - 拣货路径
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickRoute {
    pub bin_codes: Vec<String>, // 访问顺序
    pub horizontal_feet: f64,   // 水平行走距离
    pub levels_traversed: f64,  // 垂直跨越层数（累计）
}

// ==========================================
// OrderEstimate - 单订单工时估算
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEstimate {
    pub order_id: String,
    pub pick_minutes: f64,    // 拣货时长（含行走）
    pub walking_minutes: f64, // 其中行走部分
    pub pack_minutes: f64,    // 打包时长
    pub ship_minutes: f64,    // 发运时长
    pub route: PickRoute,
}

impl OrderEstimate {
    /// 指定阶段时长
    pub fn stage_minutes(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Pick => self.pick_minutes,
            Stage::Pack => self.pack_minutes,
            Stage::Ship => self.ship_minutes,
        }
    }
}

// ==========================================
// TimeModel - 工时模型
// ==========================================
pub struct TimeModel<'a> {
    config: &'a WalkingTimeConfig,
    rates: &'a HashMap<String, SkuRate>,
    bins: &'a HashMap<String, BinLocation>,
}

impl<'a> TimeModel<'a> {
    /// 构造函数
    ///
    /// # 参数
    /// - `config`: 行走参数（已校验）
    /// - `rates`: sku_code → 工时
    /// - `bins`: bin_code → 库位位置
    pub fn new(
        config: &'a WalkingTimeConfig,
        rates: &'a HashMap<String, SkuRate>,
        bins: &'a HashMap<String, BinLocation>,
    ) -> Self {
        Self { config, rates, bins }
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 拣货时长 = Σ(单件拣货工时 × 数量) + 路径行走时间（水平 + 垂直）
    pub fn estimate_pick_time(&self, lines: &[OrderLine]) -> EngineResult<f64> {
        let work = self.sum_work(lines, Stage::Pick)?;
        let route = self.plan_route(lines)?;
        Ok(work + self.walking_time(&route))
    }

    /// 打包时长 = Σ(每个订单行的打包工时)
    ///
    /// 打包工时按订单行计一次，不随件数放大。
    pub fn estimate_pack_time(&self, lines: &[OrderLine]) -> EngineResult<f64> {
        self.sum_work(lines, Stage::Pack)
    }

    /// 垂直移动时间 = 层数 × 层高 × 垂直权重 / 行走速度
    pub fn estimate_vertical_time(&self, levels_traversed: f64) -> f64 {
        if !(levels_traversed.is_finite() && levels_traversed > 0.0) {
            return 0.0;
        }
        let vertical_feet = levels_traversed * self.config.level_height_feet;
        vertical_feet * self.config.vertical_movement_weight / self.config.walking_speed_fpm
    }

    /// 水平行走时间 = 距离 / 行走速度
    pub fn estimate_horizontal_time(&self, distance_feet: f64) -> f64 {
        if !(distance_feet.is_finite() && distance_feet > 0.0) {
            return 0.0;
        }
        distance_feet / self.config.walking_speed_fpm
    }

    /// 路径行走时间：垂直时间叠加在水平时间之上
    pub fn walking_time(&self, route: &PickRoute) -> f64 {
        self.estimate_horizontal_time(route.horizontal_feet) + self.estimate_vertical_time(route.levels_traversed)
    }

    /// 估算单订单三个阶段的时长
    pub fn estimate_order(&self, order: &Order, ship_minutes: f64) -> EngineResult<OrderEstimate> {
        let pick_work = self.sum_work(&order.lines, Stage::Pick)?;
        let pack_minutes = self.sum_work(&order.lines, Stage::Pack)?;
        let route = self.plan_route(&order.lines)?;
        let walking_minutes = self.walking_time(&route);

        Ok(OrderEstimate {
            order_id: order.order_id.clone(),
            pick_minutes: pick_work + walking_minutes,
            walking_minutes,
            pack_minutes,
            ship_minutes: ship_minutes.max(0.0),
            route,
        })
    }

    /// 规划拣货路径（最近邻）
    ///
    /// 每个库位只访问一次；SKU 未配置库位的订单行不产生行走。
    pub fn plan_route(&self, lines: &[OrderLine]) -> EngineResult<PickRoute> {
        let mut stops: Vec<&BinLocation> = Vec::new();
        for line in lines {
            let rate = self.rate(&line.sku_code, Stage::Pick)?;
            let Some(bin_code) = rate.bin_code.as_deref() else {
                continue;
            };
            let location = self.bins.get(bin_code).ok_or_else(|| WaveEngineError::MissingLocation {
                sku_code: line.sku_code.clone(),
                bin_code: bin_code.to_string(),
            })?;
            if !stops.iter().any(|s| s.bin_code == location.bin_code) {
                stops.push(location);
            }
        }

        if stops.is_empty() {
            return Ok(PickRoute::default());
        }

        // 起点: 排序键最小的库位（与订单行顺序无关）
        stops.sort_by(|a, b| a.route_key().cmp(&b.route_key()));
        let mut remaining: Vec<&BinLocation> = stops.split_off(1);
        let mut current = stops[0];

        let mut route = PickRoute {
            bin_codes: vec![current.bin_code.clone()],
            horizontal_feet: 0.0,
            levels_traversed: 0.0,
        };

        while !remaining.is_empty() {
            let mut best_idx = 0;
            let mut best_distance = self.distance_feet(current, remaining[0]);
            for (idx, candidate) in remaining.iter().enumerate().skip(1) {
                let distance = self.distance_feet(current, candidate);
                let closer = distance.total_cmp(&best_distance).then_with(|| {
                    candidate.route_key().cmp(&remaining[best_idx].route_key())
                });
                if closer == std::cmp::Ordering::Less {
                    best_idx = idx;
                    best_distance = distance;
                }
            }

            let next = remaining.remove(best_idx);
            route.horizontal_feet += best_distance;
            route.levels_traversed += (next.level - current.level).abs() as f64;
            route.bin_codes.push(next.bin_code.clone());
            current = next;
        }

        Ok(route)
    }

    /// 两库位间水平距离（直角距离，跨库区加附加距离）
    pub fn distance_feet(&self, from: &BinLocation, to: &BinLocation) -> f64 {
        let aisle_feet = (from.aisle - to.aisle).abs() as f64 * self.config.aisle_spacing_feet;
        let bay_feet = (from.position - to.position).abs() as f64 * self.config.bay_width_feet;
        let zone_feet = if from.zone != to.zone {
            self.config.zone_change_feet
        } else {
            0.0
        };
        aisle_feet + bay_feet + zone_feet
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    fn rate(&self, sku_code: &str, stage: Stage) -> EngineResult<&SkuRate> {
        self.rates.get(sku_code).ok_or_else(|| WaveEngineError::MissingRate {
            sku_code: sku_code.to_string(),
            field: rate_field(stage),
        })
    }

    /// 拣货: Σ(单件工时 × 数量)；打包: Σ(行工时)
    ///
    /// 工时为 NULL/负数/非有限值视为未配置
    fn sum_work(&self, lines: &[OrderLine], stage: Stage) -> EngineResult<f64> {
        let mut total = 0.0;
        for line in lines {
            let rate = self.rate(&line.sku_code, stage)?;
            let per_unit = match stage {
                Stage::Pick => rate.pick_time_minutes,
                Stage::Pack => rate.pack_time_minutes,
                Stage::Ship => Some(0.0),
            };
            let per_unit = per_unit
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| WaveEngineError::MissingRate {
                    sku_code: line.sku_code.clone(),
                    field: rate_field(stage),
                })?;
            total += match stage {
                Stage::Pick => per_unit * line.quantity as f64,
                Stage::Pack | Stage::Ship => per_unit,
            };
        }
        Ok(total)
    }
}

fn rate_field(stage: Stage) -> &'static str {
    match stage {
        Stage::Pick => "pick_time_minutes",
        Stage::Pack => "pack_time_minutes",
        Stage::Ship => "ship_time_minutes",
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::ErrorKind;

    fn sku(code: &str, pick: Option<f64>, pack: Option<f64>, bin: Option<&str>) -> SkuRate {
        SkuRate {
            sku_code: code.to_string(),
            name: format!("SKU {}", code),
            pick_time_minutes: pick,
            pack_time_minutes: pack,
            bin_code: bin.map(|b| b.to_string()),
        }
    }

    fn bin(code: &str, zone: &str, aisle: i32, position: i32, level: i32) -> BinLocation {
        BinLocation {
            bin_code: code.to_string(),
            zone: zone.to_string(),
            aisle,
            position,
            level,
        }
    }

    fn rates(list: Vec<SkuRate>) -> HashMap<String, SkuRate> {
        list.into_iter().map(|r| (r.sku_code.clone(), r)).collect()
    }

    fn bins(list: Vec<BinLocation>) -> HashMap<String, BinLocation> {
        list.into_iter().map(|b| (b.bin_code.clone(), b)).collect()
    }

    fn config() -> WalkingTimeConfig {
        WalkingTimeConfig {
            walking_speed_fpm: 100.0,
            vertical_movement_weight: 2.0,
            aisle_spacing_feet: 10.0,
            bay_width_feet: 5.0,
            level_height_feet: 4.0,
            zone_change_feet: 0.0,
        }
    }

    #[test]
    fn test_work_only_without_bins() {
        let cfg = config();
        let rates = rates(vec![sku("A", Some(1.5), Some(1.0), None)]);
        let bins = bins(vec![]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let lines = vec![OrderLine::new(1, "A", 2)];
        assert_eq!(model.estimate_pick_time(&lines).unwrap(), 3.0);
        assert_eq!(model.estimate_pack_time(&lines).unwrap(), 1.0);
    }

    #[test]
    fn test_pack_time_counted_once_per_line() {
        let cfg = config();
        let rates = rates(vec![
            sku("A", Some(1.5), Some(1.0), None),
            sku("B", Some(2.0), Some(0.5), None),
        ]);
        let bins = bins(vec![]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        // 件数变化不影响打包时长
        for qty in [1, 2, 10] {
            assert_eq!(model.estimate_pack_time(&[OrderLine::new(1, "A", qty)]).unwrap(), 1.0);
        }
        // 多行累加
        let lines = vec![OrderLine::new(1, "A", 3), OrderLine::new(2, "B", 4)];
        assert_eq!(model.estimate_pack_time(&lines).unwrap(), 1.5);
        assert_eq!(model.estimate_pick_time(&lines).unwrap(), 12.5);
    }

    #[test]
    fn test_nearest_neighbour_route_is_independent_of_line_order() {
        let cfg = config();
        let rates = rates(vec![
            sku("A", Some(1.0), Some(0.5), Some("B-01")),
            sku("B", Some(1.0), Some(0.5), Some("B-09")),
            sku("C", Some(1.0), Some(0.5), Some("B-03")),
        ]);
        let bins = bins(vec![
            bin("B-01", "Z1", 1, 1, 0),
            bin("B-09", "Z1", 1, 9, 0),
            bin("B-03", "Z1", 1, 3, 0),
        ]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let forward = vec![
            OrderLine::new(1, "A", 1),
            OrderLine::new(2, "B", 1),
            OrderLine::new(3, "C", 1),
        ];
        let reversed: Vec<OrderLine> = forward.iter().rev().cloned().collect();

        let route = model.plan_route(&forward).unwrap();
        assert_eq!(route.bin_codes, vec!["B-01", "B-03", "B-09"]);
        // (3-1)*5 + (9-3)*5
        assert_eq!(route.horizontal_feet, 40.0);
        assert_eq!(model.plan_route(&reversed).unwrap(), route);

        let first = model.estimate_pick_time(&forward).unwrap();
        let second = model.estimate_pick_time(&forward).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, model.estimate_pick_time(&reversed).unwrap());
        // 3 件 + 40ft / 100fpm
        assert!((first - 3.4).abs() < 1e-9);
    }

    #[test]
    fn test_shared_bin_visited_once() {
        let cfg = config();
        let rates = rates(vec![
            sku("A", Some(1.0), Some(0.5), Some("B-01")),
            sku("B", Some(1.0), Some(0.5), Some("B-01")),
        ]);
        let bins = bins(vec![bin("B-01", "Z1", 1, 1, 0)]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let route = model
            .plan_route(&[OrderLine::new(1, "A", 1), OrderLine::new(2, "B", 1)])
            .unwrap();
        assert_eq!(route.bin_codes, vec!["B-01"]);
        assert_eq!(route.horizontal_feet, 0.0);
    }

    #[test]
    fn test_vertical_time_is_added_to_horizontal() {
        let cfg = config();
        let rates = rates(vec![
            sku("A", Some(0.0), Some(0.0), Some("L0")),
            sku("B", Some(0.0), Some(0.0), Some("L2")),
        ]);
        let bins = bins(vec![bin("L0", "Z1", 1, 1, 0), bin("L2", "Z1", 1, 3, 2)]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        // 2 层 × 4ft × 2.0 / 100fpm
        assert!((model.estimate_vertical_time(2.0) - 0.16).abs() < 1e-9);
        assert_eq!(model.estimate_vertical_time(0.0), 0.0);

        let lines = vec![OrderLine::new(1, "A", 1), OrderLine::new(2, "B", 1)];
        let pick = model.estimate_pick_time(&lines).unwrap();
        // 水平 10ft / 100 = 0.1，垂直 0.16
        assert!((pick - 0.26).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_removes_vertical_only() {
        let mut cfg = config();
        cfg.vertical_movement_weight = 0.0;
        let rates = rates(vec![
            sku("A", Some(0.0), Some(0.0), Some("L0")),
            sku("B", Some(0.0), Some(0.0), Some("L2")),
        ]);
        let bins = bins(vec![bin("L0", "Z1", 1, 1, 0), bin("L2", "Z1", 1, 3, 2)]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let lines = vec![OrderLine::new(1, "A", 1), OrderLine::new(2, "B", 1)];
        assert!((model.estimate_pick_time(&lines).unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_null_rate_is_missing_but_zero_is_valid() {
        let cfg = config();
        let rates = rates(vec![
            sku("NULL", None, Some(1.0), None),
            sku("ZERO", Some(0.0), Some(0.0), None),
        ]);
        let bins = bins(vec![]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let err = model.estimate_pick_time(&[OrderLine::new(1, "NULL", 1)]).unwrap_err();
        assert!(matches!(
            err,
            WaveEngineError::MissingRate { ref sku_code, field: "pick_time_minutes" } if sku_code == "NULL"
        ));
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);

        assert_eq!(model.estimate_pick_time(&[OrderLine::new(1, "ZERO", 5)]).unwrap(), 0.0);
        assert_eq!(model.estimate_pack_time(&[OrderLine::new(1, "ZERO", 5)]).unwrap(), 0.0);
    }

    #[test]
    fn test_unknown_sku_is_missing_rate() {
        let cfg = config();
        let rates = rates(vec![]);
        let bins = bins(vec![]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        assert!(matches!(
            model.estimate_pack_time(&[OrderLine::new(1, "GHOST", 1)]),
            Err(WaveEngineError::MissingRate { field: "pack_time_minutes", .. })
        ));
    }

    #[test]
    fn test_unresolvable_bin_is_missing_location() {
        let cfg = config();
        let rates = rates(vec![sku("A", Some(1.0), Some(1.0), Some("NOWHERE"))]);
        let bins = bins(vec![]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let err = model.estimate_pick_time(&[OrderLine::new(1, "A", 1)]).unwrap_err();
        assert!(matches!(
            err,
            WaveEngineError::MissingLocation { ref bin_code, .. } if bin_code == "NOWHERE"
        ));
        // 打包不依赖库位
        assert_eq!(model.estimate_pack_time(&[OrderLine::new(1, "A", 1)]).unwrap(), 1.0);
    }

    #[test]
    fn test_monotonic_in_quantity_and_distance() {
        let cfg = config();
        let rates = rates(vec![
            sku("A", Some(0.7), Some(0.3), Some("N1")),
            sku("B", Some(0.7), Some(0.3), Some("N2")),
            sku("C", Some(0.7), Some(0.3), Some("F2")),
        ]);
        let bins = bins(vec![
            bin("N1", "Z1", 1, 1, 0),
            bin("N2", "Z1", 1, 2, 0),
            bin("F2", "Z1", 6, 2, 0),
        ]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let mut previous = 0.0;
        for qty in 1..6 {
            let pick = model.estimate_pick_time(&[OrderLine::new(1, "A", qty)]).unwrap();
            assert!(pick >= previous);
            previous = pick;
        }

        let near = model
            .estimate_pick_time(&[OrderLine::new(1, "A", 1), OrderLine::new(2, "B", 1)])
            .unwrap();
        let far = model
            .estimate_pick_time(&[OrderLine::new(1, "A", 1), OrderLine::new(2, "C", 1)])
            .unwrap();
        assert!(far > near);
    }

    #[test]
    fn test_zone_change_penalty() {
        let mut cfg = config();
        cfg.zone_change_feet = 50.0;
        let rates = rates(vec![]);
        let bins = bins(vec![]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let a = bin("A", "Z1", 1, 1, 0);
        let b = bin("B", "Z2", 1, 1, 0);
        assert_eq!(model.distance_feet(&a, &b), 50.0);
        assert_eq!(model.distance_feet(&a, &a), 0.0);
    }

    #[test]
    fn test_estimate_order_bundles_stages() {
        let cfg = config();
        let rates = rates(vec![sku("A", Some(1.5), Some(1.0), None)]);
        let bins = bins(vec![]);
        let model = TimeModel::new(&cfg, &rates, &bins);

        let order = Order {
            order_id: "O1".to_string(),
            warehouse_id: 1,
            status: crate::domain::types::OrderStatus::Pending,
            carrier: None,
            priority: 0,
            created_at: chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            lines: vec![OrderLine::new(1, "A", 2)],
            wave_id: None,
            wave_sequence: None,
        };

        let estimate = model.estimate_order(&order, 0.25).unwrap();
        assert_eq!(estimate.stage_minutes(Stage::Pick), 3.0);
        assert_eq!(estimate.stage_minutes(Stage::Pack), 1.0);
        assert_eq!(estimate.stage_minutes(Stage::Ship), 0.25);
        assert_eq!(estimate.walking_minutes, 0.0);
    }
}
