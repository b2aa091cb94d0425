//! Level catalog: tracked variables, stimulus and action tables, and the
//! per-level physiology constants (bands, critical thresholds, recovery points).
//!
//! Recovery values are tuned per level and deliberately not derived from the
//! bands.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::LEVEL_COUNT;

/// Campaign level identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelId {
    Thermoregulation,
    WaterBalance,
    BloodSugar,
    SystemInteraction,
}

impl LevelId {
    pub const ALL: [Self; 4] = [
        Self::Thermoregulation,
        Self::WaterBalance,
        Self::BloodSugar,
        Self::SystemInteraction,
    ];

    /// One-based level number used in persisted records.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Thermoregulation => 1,
            Self::WaterBalance => 2,
            Self::BloodSugar => 3,
            Self::SystemInteraction => 4,
        }
    }

    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Thermoregulation),
            2 => Some(Self::WaterBalance),
            3 => Some(Self::BloodSugar),
            4 => Some(Self::SystemInteraction),
            _ => None,
        }
    }

    /// The level unlocked by completing this one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        if self.number() >= LEVEL_COUNT {
            return None;
        }
        Self::from_number(self.number() + 1)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Thermoregulation => "thermoregulation",
            Self::WaterBalance => "water_balance",
            Self::BloodSugar => "blood_sugar",
            Self::SystemInteraction => "system_interaction",
        }
    }

    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Ok(number) = token.parse::<u8>() {
            return Self::from_number(number);
        }
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(&token.replace('-', "_")))
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physiological quantity tracked by a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Temperature,
    Hydration,
    Glucose,
}

impl VariableKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Hydration => "hydration",
            Self::Glucose => "glucose",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a band a value sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deviation {
    Low,
    High,
}

/// Closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    /// Side of the band the value falls outside of, if any.
    #[must_use]
    pub fn deviation(&self, value: f64) -> Option<Deviation> {
        if value < self.min {
            Some(Deviation::Low)
        } else if value > self.max {
            Some(Deviation::High)
        } else {
            None
        }
    }
}

/// Per-tick drift: `base + u * spread` with `u` uniform in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Drift {
    pub base: f64,
    pub spread: f64,
}

impl Drift {
    /// Symmetric drift in `[-half_width, half_width)`.
    #[must_use]
    pub const fn symmetric(half_width: f64) -> Self {
        Self {
            base: -half_width,
            spread: half_width * 2.0,
        }
    }

    #[must_use]
    pub fn delta(&self, unit: f64) -> f64 {
        self.base + unit * self.spread
    }
}

/// Text pair shown for a value on either side of a band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidedText {
    pub low: String,
    pub high: String,
}

impl SidedText {
    fn new(low: &str, high: &str) -> Self {
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    #[must_use]
    pub fn for_side(&self, side: Deviation) -> &str {
        match side {
            Deviation::Low => &self.low,
            Deviation::High => &self.high,
        }
    }
}

/// Static description of one tracked variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub kind: VariableKind,
    pub unit: String,
    pub domain: Band,
    pub normal: Band,
    pub critical: Band,
    /// Value forced after a breach, per breach side; sits inside `critical`.
    pub recovery_low: f64,
    pub recovery_high: f64,
    pub start: f64,
    pub drift: Drift,
    pub critical_text: SidedText,
    pub hint_text: SidedText,
    /// Feedback after an action leaves the value out of band.
    pub action_text: SidedText,
}

impl VariableSpec {
    #[must_use]
    pub const fn recovery_for(&self, side: Deviation) -> f64 {
        match side {
            Deviation::Low => self.recovery_low,
            Deviation::High => self.recovery_high,
        }
    }
}

/// Semantic direction of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    Raises,
    Lowers,
    Neutral,
}

/// A player response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub target: VariableKind,
    pub effect: f64,
    pub tag: ActionTag,
    pub description: String,
}

impl Action {
    fn new(id: &str, name: &str, target: VariableKind, effect: f64, description: &str) -> Self {
        let tag = if effect > 0.0 {
            ActionTag::Raises
        } else if effect < 0.0 {
            ActionTag::Lowers
        } else {
            ActionTag::Neutral
        };
        Self {
            id: id.to_string(),
            name: name.to_string(),
            target,
            effect,
            tag,
            description: description.to_string(),
        }
    }
}

/// A random event pushing a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub text: String,
    pub target: VariableKind,
    pub effect: f64,
}

impl Stimulus {
    fn new(text: &str, target: VariableKind, effect: f64) -> Self {
        Self {
            text: text.to_string(),
            target,
            effect,
        }
    }
}

/// Failure scenario briefed before a level begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub title: String,
    pub description: String,
    pub disabled_actions: Vec<String>,
    /// Feedback when a disabled action is attempted.
    pub blocked_text: String,
    /// Shown on the results view.
    pub results_note: String,
}

/// Complete static description of a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub id: LevelId,
    pub name: String,
    pub description: String,
    pub duration_secs: u32,
    pub variables: SmallVec<[VariableSpec; 3]>,
    pub stimuli: Vec<Stimulus>,
    pub actions: Vec<Action>,
    pub scenario: Option<Scenario>,
    /// Feedback when an action leaves every variable in band.
    pub corrected_text: String,
    /// Feedback after actions on multi-variable levels.
    pub monitor_text: Option<String>,
    pub balanced_hint: String,
}

impl LevelSpec {
    /// Catalog entry for `id`.
    #[must_use]
    pub fn get(id: LevelId) -> &'static Self {
        let catalog = catalog();
        let index = usize::from(id.number() - 1);
        &catalog[index]
    }

    #[must_use]
    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub fn variable(&self, kind: VariableKind) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.kind == kind)
    }

    #[must_use]
    pub fn is_disabled(&self, action_id: &str) -> bool {
        self.scenario
            .as_ref()
            .is_some_and(|s| s.disabled_actions.iter().any(|id| id == action_id))
    }
}

/// All four levels, built once.
#[must_use]
pub fn catalog() -> &'static [LevelSpec; 4] {
    static CATALOG: OnceLock<[LevelSpec; 4]> = OnceLock::new();
    CATALOG.get_or_init(|| {
        [
            thermoregulation(),
            water_balance(),
            blood_sugar(),
            system_interaction(),
        ]
    })
}

fn temperature_spec(drift: Drift) -> VariableSpec {
    VariableSpec {
        kind: VariableKind::Temperature,
        unit: "°C".to_string(),
        domain: Band::new(34.0, 42.0),
        normal: Band::new(36.5, 37.5),
        critical: Band::new(35.0, 40.0),
        recovery_low: 36.0,
        recovery_high: 39.0,
        start: 37.0,
        drift,
        critical_text: SidedText::new(
            "Critical! Body temperature is dangerously low!",
            "Critical! Body temperature is dangerously high!",
        ),
        hint_text: SidedText::new(
            "Temperature is LOW. Shivering generates heat through muscle activity.",
            "Temperature is HIGH. Sweating helps release heat and cool the body down.",
        ),
        action_text: SidedText::new(
            "Body temperature is too low! The hypothalamus triggers shivering to generate heat.",
            "Body temperature is too high! The hypothalamus detects this and triggers sweating to cool down.",
        ),
    }
}

fn hydration_spec(drift: Drift) -> VariableSpec {
    VariableSpec {
        kind: VariableKind::Hydration,
        unit: "%".to_string(),
        domain: Band::new(0.0, 100.0),
        normal: Band::new(40.0, 60.0),
        critical: Band::new(20.0, 85.0),
        recovery_low: 35.0,
        recovery_high: 70.0,
        start: 50.0,
        drift,
        critical_text: SidedText::new(
            "Critical! Severe dehydration detected!",
            "Critical! Overhydration can dilute electrolytes!",
        ),
        hint_text: SidedText::new(
            "Hydration is LOW. Drinking water will restore fluid levels. The kidneys help regulate water balance.",
            "Hydration is HIGH. Reducing activity conserves water. Excess water is removed through urine.",
        ),
        action_text: SidedText::new(
            "Dehydration detected! The body signals thirst to encourage water intake.",
            "Hydration level is too high! Kidneys will increase urine output.",
        ),
    }
}

fn glucose_spec(drift: Drift, critical_max: f64, recovery_high: f64) -> VariableSpec {
    VariableSpec {
        kind: VariableKind::Glucose,
        unit: "mg/dL".to_string(),
        domain: Band::new(30.0, 180.0),
        normal: Band::new(70.0, 100.0),
        critical: Band::new(50.0, critical_max),
        recovery_low: 65.0,
        recovery_high,
        start: 85.0,
        drift,
        critical_text: SidedText::new(
            "Critical! Hypoglycemia - blood sugar is dangerously low!",
            "Critical! Hyperglycemia - blood sugar is dangerously high!",
        ),
        hint_text: SidedText::new(
            "Blood glucose is LOW. Eating provides glucose. The pancreas releases glucagon to release stored glucose.",
            "Blood glucose is HIGH. The pancreas releases insulin to help cells absorb glucose, lowering blood sugar levels.",
        ),
        action_text: SidedText::new(
            "Blood glucose is too low! Pancreas releases glucagon to raise it.",
            "Blood glucose is too high! Pancreas releases insulin to lower it.",
        ),
    }
}

fn thermoregulation() -> LevelSpec {
    use VariableKind::Temperature as T;
    LevelSpec {
        id: LevelId::Thermoregulation,
        name: "Thermoregulation".to_string(),
        description: "Maintain normal body temperature".to_string(),
        duration_secs: 60,
        variables: SmallVec::from_iter([temperature_spec(Drift::symmetric(0.1))]),
        stimuli: vec![
            Stimulus::new("The character runs under the hot sun.", T, 2.0),
            Stimulus::new("The character enters a cold room.", T, -2.0),
            Stimulus::new("The character exercises vigorously.", T, 1.5),
            Stimulus::new("The character drinks cold water.", T, -0.5),
            Stimulus::new("The character has a fever.", T, 1.0),
            Stimulus::new("The character is in an air-conditioned room.", T, -1.0),
        ],
        actions: vec![
            Action::new("sweat", "Sweat", T, -1.0, "Release heat through sweating"),
            Action::new("shiver", "Shiver", T, 1.0, "Generate heat through shivering"),
            Action::new("rest", "Rest", T, 0.0, "Allow natural regulation"),
        ],
        scenario: None,
        corrected_text: "Negative feedback activated: body temperature is returning to normal."
            .to_string(),
        monitor_text: None,
        balanced_hint: "Temperature is normal. Rest to maintain current balance.".to_string(),
    }
}

fn water_balance() -> LevelSpec {
    use VariableKind::Hydration as H;
    LevelSpec {
        id: LevelId::WaterBalance,
        name: "Water Balance".to_string(),
        description: "Maintain proper hydration".to_string(),
        duration_secs: 60,
        variables: SmallVec::from_iter([hydration_spec(Drift {
            base: -1.0,
            spread: 0.5,
        })]),
        stimuli: vec![
            Stimulus::new("The character sweats heavily.", H, -15.0),
            Stimulus::new("The character is in a dry environment.", H, -10.0),
            Stimulus::new("The character exercises without water.", H, -20.0),
            Stimulus::new("The character eats salty food.", H, -8.0),
            Stimulus::new("The character drinks excess water.", H, 15.0),
        ],
        actions: vec![
            Action::new("drink", "Drink Water", H, 20.0, "Increase hydration"),
            Action::new("reduce", "Reduce Activity", H, 5.0, "Conserve water"),
            Action::new("rest", "Rest", H, 0.0, "Allow natural regulation"),
        ],
        scenario: None,
        corrected_text: "Maintaining balance in one system can affect another.".to_string(),
        monitor_text: None,
        balanced_hint:
            "Hydration is normal. Maintain current balance through moderate activity.".to_string(),
    }
}

fn blood_sugar() -> LevelSpec {
    use VariableKind::Glucose as G;
    LevelSpec {
        id: LevelId::BloodSugar,
        name: "Blood Sugar".to_string(),
        description: "Stabilize blood glucose levels".to_string(),
        duration_secs: 60,
        variables: SmallVec::from_iter([glucose_spec(
            Drift {
                base: -2.0,
                spread: 1.0,
            },
            140.0,
            120.0,
        )]),
        stimuli: vec![
            Stimulus::new("The character eats a large meal.", G, 40.0),
            Stimulus::new("The character skips breakfast.", G, -20.0),
            Stimulus::new("The character exercises intensely.", G, -30.0),
            Stimulus::new("The character drinks sugary soda.", G, 35.0),
            Stimulus::new("The character is stressed.", G, 15.0),
            Stimulus::new("The character fasts for hours.", G, -25.0),
        ],
        actions: vec![
            Action::new("eat", "Eat", G, 25.0, "Increase blood sugar"),
            Action::new("insulin", "Release Insulin", G, -30.0, "Lower blood sugar"),
            Action::new("rest", "Rest", G, 0.0, "Allow natural regulation"),
        ],
        scenario: None,
        corrected_text: "This is an example of negative feedback regulation.".to_string(),
        monitor_text: None,
        balanced_hint: "Blood glucose is normal. This is negative feedback in action - the body maintains balance automatically.".to_string(),
    }
}

fn system_interaction() -> LevelSpec {
    use VariableKind::{Glucose as G, Hydration as H, Temperature as T};

    let mut temperature = temperature_spec(Drift::symmetric(0.15));
    temperature.critical_text = SidedText::new("Hypothermia risk!", "Critical temperature!");
    temperature.hint_text = SidedText::new(
        "Temperature is low. Shivering generates heat.",
        "Temperature is high. Sweating helps cool down.",
    );
    let mut hydration = hydration_spec(Drift {
        base: -1.5,
        spread: 0.5,
    });
    hydration.critical_text = SidedText::new("Severe dehydration!", "Overhydration!");
    hydration.hint_text = SidedText::new(
        "Dehydration detected. Drink water.",
        "Overhydrated. Reduce water intake.",
    );
    // Insulin failure: glucose climbs instead of being consumed.
    let mut glucose = glucose_spec(
        Drift {
            base: 2.0,
            spread: 2.0,
        },
        150.0,
        130.0,
    );
    glucose.critical_text = SidedText::new(
        "Hypoglycemia!",
        "Hyperglycemia! Without insulin, glucose cannot enter cells.",
    );
    glucose.hint_text = SidedText::new(
        "Glucose is low. Eat to raise blood sugar.",
        "Glucose is high. Without insulin, try eating less and resting to slow glucose rise.",
    );

    LevelSpec {
        id: LevelId::SystemInteraction,
        name: "System Interaction".to_string(),
        description: "Manage multiple systems with failures".to_string(),
        duration_secs: 90,
        variables: SmallVec::from_iter([glucose, temperature, hydration]),
        stimuli: Vec::new(),
        actions: vec![
            Action::new("sweat", "Sweat", T, -0.8, "Cool down"),
            Action::new("shiver", "Shiver", T, 0.8, "Warm up"),
            Action::new("drink", "Drink", H, 15.0, "Hydrate"),
            Action::new("reduce", "Conserve", H, 3.0, "Save water"),
            Action::new("eat", "Eat", G, 20.0, "Raise sugar"),
            Action::new("insulin", "Insulin", G, -25.0, "Lower sugar"),
            Action::new("rest", "Rest", G, -5.0, "Use less"),
        ],
        scenario: Some(Scenario {
            title: "Insulin Response Disabled".to_string(),
            description: "The pancreas cannot produce insulin. You must manage blood sugar through diet and activity only.".to_string(),
            disabled_actions: vec!["insulin".to_string()],
            blocked_text: "Insulin response is disabled! You must use other methods.".to_string(),
            results_note: "This scenario simulates diabetes - when insulin response fails, maintaining glucose balance becomes very difficult.".to_string(),
        }),
        corrected_text: "Action applied. Monitor all systems!".to_string(),
        monitor_text: Some("Action applied. Monitor all systems!".to_string()),
        balanced_hint: "All systems are balanced! Keep monitoring.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_numbers_roundtrip_and_chain() {
        for id in LevelId::ALL {
            assert_eq!(LevelId::from_number(id.number()), Some(id));
        }
        assert_eq!(LevelId::from_number(0), None);
        assert_eq!(LevelId::from_number(5), None);
        assert_eq!(
            LevelId::Thermoregulation.next(),
            Some(LevelId::WaterBalance)
        );
        assert_eq!(LevelId::SystemInteraction.next(), None);
    }

    #[test]
    fn parse_accepts_numbers_and_names() {
        assert_eq!(LevelId::parse("3"), Some(LevelId::BloodSugar));
        assert_eq!(LevelId::parse("water-balance"), Some(LevelId::WaterBalance));
        assert_eq!(
            LevelId::parse("System_Interaction"),
            Some(LevelId::SystemInteraction)
        );
        assert_eq!(LevelId::parse("nope"), None);
    }

    #[test]
    fn catalog_bands_are_nested() {
        for level in catalog() {
            assert!(!level.variables.is_empty());
            for var in &level.variables {
                assert!(var.domain.min <= var.critical.min);
                assert!(var.critical.min < var.normal.min);
                assert!(var.normal.max < var.critical.max);
                assert!(var.critical.max <= var.domain.max);
                assert!(var.critical.contains(var.recovery_low));
                assert!(var.critical.contains(var.recovery_high));
                assert!(var.normal.contains(var.start));
            }
            for action in &level.actions {
                assert!(level.variable(action.target).is_some());
            }
            for stimulus in &level.stimuli {
                assert!(level.variable(stimulus.target).is_some());
            }
        }
    }

    #[test]
    fn system_interaction_disables_insulin() {
        let level = LevelSpec::get(LevelId::SystemInteraction);
        assert_eq!(level.variables.len(), 3);
        assert_eq!(level.duration_secs, 90);
        assert!(level.is_disabled("insulin"));
        assert!(!level.is_disabled("eat"));
        assert!(!LevelSpec::get(LevelId::BloodSugar).is_disabled("insulin"));
        let glucose = level.variable(VariableKind::Glucose).unwrap();
        assert!((glucose.critical.max - 150.0).abs() < f64::EPSILON);
        assert!(glucose.drift.base > 0.0);
    }

    #[test]
    fn action_tags_follow_effect_sign() {
        let level = LevelSpec::get(LevelId::Thermoregulation);
        assert_eq!(level.action("sweat").unwrap().tag, ActionTag::Lowers);
        assert_eq!(level.action("shiver").unwrap().tag, ActionTag::Raises);
        assert_eq!(level.action("rest").unwrap().tag, ActionTag::Neutral);
    }

    #[test]
    fn band_helpers() {
        let band = Band::new(1.0, 2.0);
        assert_eq!(band.deviation(0.5), Some(Deviation::Low));
        assert_eq!(band.deviation(2.5), Some(Deviation::High));
        assert_eq!(band.deviation(1.0), None);
        assert!((band.clamp(9.0) - 2.0).abs() < f64::EPSILON);
        assert!((band.clamp(f64::NAN) - 1.0).abs() < f64::EPSILON);
        let drift = Drift::symmetric(0.1);
        assert!((drift.delta(0.0) + 0.1).abs() < 1e-12);
        assert!((drift.delta(1.0) - 0.1).abs() < 1e-12);
    }
}
