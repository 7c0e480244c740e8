//! Sound catalog: the nine built-in UI sound recipes and their parameters.
//!
//! A recipe is a list of bounded parameter descriptors plus a function that
//! turns bound values into a graph template and an automation plan.
//! Resolving clamps out-of-range overrides into bounds instead of failing.
//! Unknown names are rejected outright.

mod recipes;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EarconError, Result};
use crate::graph::GraphTemplate;
use crate::rules::ValidationRules;
use crate::scheduler::EventPlan;

/// One of the built-in sound archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Click,
    Toggle,
    Hover,
    Success,
    Error,
    Warning,
    Notification,
    Whoosh,
    Pop,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Click,
        Category::Toggle,
        Category::Hover,
        Category::Success,
        Category::Error,
        Category::Warning,
        Category::Notification,
        Category::Whoosh,
        Category::Pop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Click => "click",
            Category::Toggle => "toggle",
            Category::Hover => "hover",
            Category::Success => "success",
            Category::Error => "error",
            Category::Warning => "warning",
            Category::Notification => "notification",
            Category::Whoosh => "whoosh",
            Category::Pop => "pop",
        }
    }

    /// Whether every rendering of this category is bit-identical.
    pub fn is_deterministic(self) -> bool {
        !matches!(self, Category::Click | Category::Whoosh)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EarconError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EarconError::UnknownCategory(s.to_string()))
    }
}

/// A tunable recipe parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    /// What raising the value does to the sound, for the vocabulary layer.
    pub effect: &'static str,
}

impl ParamSpec {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Caller-supplied parameter values, by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides(BTreeMap<String, f64>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Read `{name: number | bool}` as sent by the vocabulary layer.
    /// Booleans become 1 / 0; `null` means no overrides.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = match value {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(map) => map,
            other => {
                return Err(EarconError::InvalidOverride {
                    name: String::new(),
                    reason: format!("expected an object of overrides, got {other}"),
                });
            }
        };
        let mut out = Self::default();
        for (name, v) in object {
            let number = match v {
                serde_json::Value::Bool(b) => f64::from(u8::from(*b)),
                serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| EarconError::InvalidOverride {
                    name: name.clone(),
                    reason: format!("{n} is not representable as f64"),
                })?,
                other => {
                    return Err(EarconError::InvalidOverride {
                        name: name.clone(),
                        reason: format!("expected a number or boolean, got {other}"),
                    });
                }
            };
            out.set(name.clone(), number);
        }
        Ok(out)
    }
}

/// Final, in-bounds values for every parameter of a recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundParams(BTreeMap<&'static str, f64>);

impl BoundParams {
    pub fn from_pairs(pairs: &[(&'static str, f64)]) -> Self {
        BoundParams(pairs.iter().copied().collect())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Value of a parameter the recipe is known to declare.
    pub(crate) fn value(&self, name: &str) -> f64 {
        self.get(name).unwrap_or_default()
    }

    /// Boolean view of a 0/1 parameter.
    pub(crate) fn flag(&self, name: &str) -> bool {
        self.value(name) >= 0.5
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Declarative definition of one category.
#[derive(Debug)]
pub struct Recipe {
    pub category: Category,
    pub params: &'static [ParamSpec],
    build: fn(&BoundParams) -> (GraphTemplate, EventPlan),
}

impl Recipe {
    pub fn spec(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Bind overrides to this recipe's parameters, clamping into bounds.
    pub fn bind(&self, overrides: &Overrides) -> Result<BoundParams> {
        let mut bound: BTreeMap<&'static str, f64> = self.params.iter().map(|p| (p.name, p.default)).collect();
        for (name, value) in overrides.iter() {
            let spec = self.spec(name).ok_or_else(|| EarconError::UnknownParameter {
                category: self.category.to_string(),
                name: name.to_string(),
            })?;
            if value.is_nan() {
                return Err(EarconError::InvalidOverride {
                    name: name.to_string(),
                    reason: "value is NaN".into(),
                });
            }
            let clamped = spec.clamp(value);
            if clamped != value {
                tracing::warn!(
                    category = %self.category,
                    param = name,
                    requested = value,
                    clamped,
                    "override out of bounds, clamped"
                );
            }
            bound.insert(spec.name, clamped);
        }
        Ok(BoundParams(bound))
    }
}

/// Output of [`SoundCatalog::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSound {
    pub category: Category,
    pub template: GraphTemplate,
    pub params: BoundParams,
    pub events: EventPlan,
}

/// Registry of every built-in recipe.
#[derive(Debug)]
pub struct SoundCatalog {
    recipes: Vec<Recipe>,
}

impl Default for SoundCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundCatalog {
    pub fn new() -> Self {
        SoundCatalog {
            recipes: recipes::all(),
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.recipes.iter().map(|r| r.category)
    }

    pub fn recipe(&self, category: Category) -> &Recipe {
        // `recipes::all` yields one entry per category, in declaration order.
        &self.recipes[category as usize]
    }

    /// Parameter descriptors of a category.
    pub fn describe(&self, category: Category) -> &'static [ParamSpec] {
        self.recipe(category).params
    }

    /// Resolve a category name and overrides into a template, bound
    /// parameters, and the relative automation plan.
    pub fn resolve(&self, category: &str, overrides: &Overrides) -> Result<ResolvedSound> {
        self.resolve_category(category.parse()?, overrides)
    }

    pub fn resolve_category(&self, category: Category, overrides: &Overrides) -> Result<ResolvedSound> {
        let recipe = self.recipe(category);
        ValidationRules::check_specs(category, recipe.params)?;
        let params = recipe.bind(overrides)?;
        let (template, events) = (recipe.build)(&params);
        Ok(ResolvedSound {
            category,
            template,
            params,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{CurveKind, ParamKind};
    use crate::graph::{NodeTemplate, SignalGraph, SignalNode};
    use crate::scheduler::EnvelopeScheduler;

    fn catalog() -> SoundCatalog {
        SoundCatalog::new()
    }

    #[test]
    fn recipe_order_matches_categories() {
        let cat = catalog();
        for c in Category::ALL {
            assert_eq!(cat.recipe(c).category, c);
        }
    }

    #[test]
    fn category_parsing() {
        assert_eq!("Toggle".parse::<Category>().unwrap(), Category::Toggle);
        assert_eq!(" pop ".parse::<Category>().unwrap(), Category::Pop);
        assert_eq!(
            "beep".parse::<Category>().unwrap_err(),
            EarconError::UnknownCategory("beep".into())
        );
    }

    #[test]
    fn unknown_parameter_rejected() {
        let err = catalog()
            .resolve("hover", &Overrides::new().with("brightness", 1.0))
            .unwrap_err();
        assert_eq!(
            err,
            EarconError::UnknownParameter {
                category: "hover".into(),
                name: "brightness".into()
            }
        );
    }

    #[test]
    fn nan_override_rejected() {
        let err = catalog()
            .resolve("pop", &Overrides::new().with("volume", f64::NAN))
            .unwrap_err();
        assert!(matches!(err, EarconError::InvalidOverride { .. }));
    }

    #[test]
    fn error_volume_clamped_to_category_bound() {
        let sound = catalog()
            .resolve("error", &Overrides::new().with("volume", 1.0))
            .unwrap();
        assert_eq!(sound.params.get("volume"), Some(0.4));
        let peak = sound
            .events
            .automation
            .iter()
            .filter(|e| e.target.param == ParamKind::Gain)
            .map(|e| e.start_value.max(e.end_value))
            .fold(0.0, f64::max);
        assert!(peak <= 0.4, "peak gain {peak}");
    }

    #[test]
    fn click_q_clamped_not_rejected() {
        let sound = catalog().resolve("click", &Overrides::new().with("q", 20.0)).unwrap();
        assert_eq!(sound.params.get("q"), Some(10.0));
        let graph = SignalGraph::build_at_rate(&sound.template, &sound.params, 44100.0).unwrap();
        assert!(graph.nodes().iter().any(|n| matches!(
            n,
            SignalNode::BiquadFilter { q, .. } if *q == 10.0
        )));
    }

    #[test]
    fn toggle_on_sweeps_up() {
        let sound = catalog()
            .resolve("toggle", &Overrides::new().with("isOn", 1.0))
            .unwrap();
        let sweep = sound
            .events
            .automation
            .iter()
            .find(|e| e.target.param == ParamKind::Frequency && e.is_ramp())
            .unwrap();
        assert!((sweep.start_value - 500.0).abs() < 1e-9);
        assert!((sweep.end_value - 700.0).abs() < 1e-9);
        assert!((sweep.duration() - 0.12).abs() < 1e-12);
        assert_eq!(sweep.curve, CurveKind::Exponential);
    }

    #[test]
    fn toggle_off_sweeps_down() {
        let sound = catalog()
            .resolve("toggle", &Overrides::new().with("isOn", 0.0))
            .unwrap();
        let sweep = sound
            .events
            .automation
            .iter()
            .find(|e| e.target.param == ParamKind::Frequency && e.is_ramp())
            .unwrap();
        assert!(sweep.end_value < sweep.start_value);
    }

    #[test]
    fn notification_uses_fm_pair() {
        let sound = catalog().resolve("notification", &Overrides::new()).unwrap();
        assert!(
            sound
                .template
                .nodes
                .iter()
                .any(|n| matches!(n, NodeTemplate::FmPair { .. }))
        );
    }

    #[test]
    fn every_default_recipe_schedules() {
        let cat = catalog();
        for c in Category::ALL {
            let sound = cat.resolve_category(c, &Overrides::new()).unwrap();
            let graph = SignalGraph::build_at_rate(&sound.template, &sound.params, 44100.0)
                .unwrap_or_else(|e| panic!("{c}: {e}"));
            ValidationRules::check(c, &graph, &sound.events, &sound.params)
                .unwrap_or_else(|e| panic!("{c}: {e}"));
            EnvelopeScheduler::schedule(&graph, &sound.events, 0.0).unwrap_or_else(|e| panic!("{c}: {e}"));
        }
    }

    #[test]
    fn overrides_from_json() {
        let json = serde_json::json!({"isOn": true, "volume": 0.2});
        let o = Overrides::from_json(&json).unwrap();
        assert_eq!(o.get("isOn"), Some(1.0));
        assert_eq!(o.get("volume"), Some(0.2));

        assert!(Overrides::from_json(&serde_json::Value::Null).unwrap().is_empty());
        let err = Overrides::from_json(&serde_json::json!({"volume": "loud"})).unwrap_err();
        assert!(matches!(err, EarconError::InvalidOverride { name, .. } if name == "volume"));
    }
}
