//! 元素定位：显式有序的查找策略链
//!
//! 计划里的 target id 要在执行时重新落到真实元素上。三个策略按序尝试，
//! 每个都显式返回找到 / 未找到；窗口级失败记日志后继续，不静默吞掉原因。
//! 位置键策略把 `role_x_y` 形式的 id 还原成"角色 + 坐标 ± 10"的匹配框，
//! 与发现侧的合成规则对应。

use std::sync::Arc;

use crate::perception::backend::{
    AccessibilityProvider, DiscoveryError, ElementRole, RawElement, WindowRef,
};

/// 坐标匹配容差（位置键策略）
const POSITION_TOLERANCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    ByIdentifier,
    ByTitle,
    ByPositionKey,
}

impl LookupStrategy {
    pub const ORDER: [LookupStrategy; 3] = [
        LookupStrategy::ByIdentifier,
        LookupStrategy::ByTitle,
        LookupStrategy::ByPositionKey,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LookupStrategy::ByIdentifier => "by-identifier",
            LookupStrategy::ByTitle => "by-title",
            LookupStrategy::ByPositionKey => "by-position-key",
        }
    }

    /// 在一组元素中应用本策略；None 即未找到
    fn apply<'a>(&self, elements: &'a [RawElement], target: &str) -> Option<&'a RawElement> {
        match self {
            LookupStrategy::ByIdentifier => {
                elements.iter().find(|e| e.identifier == target)
            }
            LookupStrategy::ByTitle => elements.iter().find(|e| e.title == target),
            LookupStrategy::ByPositionKey => {
                let (role, x, y) = parse_position_key(target)?;
                elements.iter().find(|e| {
                    e.role == role
                        && (e.position.0 - x).abs() < POSITION_TOLERANCE
                        && (e.position.1 - y).abs() < POSITION_TOLERANCE
                })
            }
        }
    }
}

/// 解析合成 id `role_x_y`；不是该形式时返回 None
fn parse_position_key(target: &str) -> Option<(String, f64, f64)> {
    let mut parts = target.rsplitn(3, '_');
    let y = parts.next()?.parse::<f64>().ok()?;
    let x = parts.next()?.parse::<f64>().ok()?;
    let role = parts.next()?.to_string();
    ElementRole::from_normalized(&role)?;
    Some((role, x, y))
}

pub struct ElementLookup {
    provider: Arc<dyn AccessibilityProvider>,
}

impl ElementLookup {
    pub fn new(provider: Arc<dyn AccessibilityProvider>) -> Self {
        Self { provider }
    }

    /// 在应用的所有窗口中解析 target；找不到返回 Ok(None)
    pub async fn resolve(
        &self,
        app: &str,
        target: &str,
    ) -> Result<Option<(WindowRef, RawElement)>, DiscoveryError> {
        let windows = self.provider.windows(app).await?;
        for window in &windows {
            let mut elements: Vec<RawElement> = Vec::new();
            for role in ElementRole::ALL {
                match self.provider.elements(window, role).await {
                    Ok(mut found) => elements.append(&mut found),
                    Err(e) => {
                        tracing::warn!(
                            role = role.as_str(),
                            window = window.index,
                            error = %e,
                            "lookup scan failed for role"
                        );
                    }
                }
            }

            for strategy in LookupStrategy::ORDER {
                if let Some(element) = strategy.apply(&elements, target) {
                    tracing::debug!(
                        strategy = strategy.name(),
                        target,
                        "element resolved"
                    );
                    return Ok(Some((window.clone(), element.clone())));
                }
                tracing::trace!(strategy = strategy.name(), target, "strategy missed");
            }
        }
        Ok(None)
    }

    /// 弹出菜单展开后查找选项（menu-item 标题大小写不敏感包含匹配）
    pub async fn resolve_option(
        &self,
        window: &WindowRef,
        option: &str,
    ) -> Result<Option<RawElement>, DiscoveryError> {
        let items = self.provider.elements(window, ElementRole::MenuItem).await?;
        let wanted = option.to_lowercase();
        Ok(items
            .into_iter()
            .find(|e| e.title.to_lowercase().contains(&wanted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(role: &str, identifier: &str, title: &str, x: f64, y: f64) -> RawElement {
        RawElement {
            role: role.to_string(),
            identifier: identifier.to_string(),
            title: title.to_string(),
            position: (x, y),
            ..Default::default()
        }
    }

    #[test]
    fn position_key_parses_role_and_coordinates() {
        let (role, x, y) = parse_position_key("button_533_310").unwrap();
        assert_eq!(role, "button");
        assert_eq!((x, y), (533.0, 310.0));
        // text-field 自身带下划线之外的连字符，同样可解析
        assert!(parse_position_key("text-field_10_20").is_some());
        assert!(parse_position_key("not-a-key").is_none());
        assert!(parse_position_key("made_up_role_1_2").is_none());
    }

    #[test]
    fn identifier_strategy_wins_before_title() {
        let elements = vec![
            raw("button", "save", "Export", 0.0, 0.0),
            raw("button", "other", "save", 10.0, 0.0),
        ];
        let hit = LookupStrategy::ByIdentifier.apply(&elements, "save").unwrap();
        assert_eq!(hit.title, "Export");
    }

    #[test]
    fn position_strategy_matches_within_tolerance() {
        let elements = vec![raw("button", "", "OK", 530.0, 305.0)];
        assert!(LookupStrategy::ByPositionKey
            .apply(&elements, "button_533_310")
            .is_some());
        assert!(LookupStrategy::ByPositionKey
            .apply(&elements, "button_600_310")
            .is_none());
    }
}
