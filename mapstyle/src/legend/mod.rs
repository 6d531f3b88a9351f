use crate::error::Result;
use crate::model::RuleList;
use crate::resolver::{ResolvedStyle, StyleResolver};
use serde::Serialize;

/// One visible row of a layer's legend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub legend_text: String,
    pub style: ResolvedStyle,
}

/// Build the legend for a rule list, independent of any feature.
///
/// One entry per rule in rule order, resolved without hover. Rules with
/// empty legend text are left out. Rules that resolve to the same text and
/// the same appearance collapse into the first of them.
pub fn build_legend(rules: &RuleList, resolver: &StyleResolver<'_>) -> Result<Vec<LegendEntry>> {
    let mut entries: Vec<LegendEntry> = Vec::with_capacity(rules.len());

    for rule in rules {
        if rule.legend_text.trim().is_empty() {
            continue;
        }

        let style = resolver.resolve_style(&rule.style, false)?;
        let duplicate = entries
            .iter()
            .any(|e| e.legend_text == rule.legend_text && e.style.same_appearance(&style));
        if duplicate {
            log::debug!(
                "Legend: rule '{}' duplicates an earlier entry '{}'",
                rule.id,
                rule.legend_text
            );
            continue;
        }

        entries.push(LegendEntry {
            legend_text: rule.legend_text.clone(),
            style,
        });
    }

    Ok(entries)
}
