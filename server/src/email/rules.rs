use entity::classification_rule::{self, ConditionField, ConditionOperator, RuleCondition};
use entity::sea_orm_active_enums::Priority;

use super::mime::NormalizedMessage;

/// What a matching rule assigns to a message. Every part is optional; the
/// caller decides the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Action {
    pub label: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub name: String,
    pub conditions: Vec<RuleCondition>,
    pub action: Action,
    pub is_active: bool,
}

impl From<classification_rule::Model> for ClassificationRule {
    fn from(model: classification_rule::Model) -> Self {
        Self {
            name: model.name,
            conditions: model.conditions.0,
            action: Action {
                label: model.action_label,
                priority: model.action_priority,
                category: model.action_category,
            },
            is_active: model.is_active,
        }
    }
}

/// Ordered rule list for one user
#[derive(Debug, Clone, Default)]
pub struct UserRules {
    data: Vec<ClassificationRule>,
}

impl UserRules {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { data: rules }
    }

    pub fn data(&self) -> &[ClassificationRule] {
        &self.data
    }

    pub fn classify(&self, message: &NormalizedMessage) -> Action {
        classify(&self.data, message)
    }
}

impl FromIterator<classification_rule::Model> for UserRules {
    fn from_iter<I: IntoIterator<Item = classification_rule::Model>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(ClassificationRule::from).collect())
    }
}

type Evaluator = fn(&str, &str) -> bool;

fn contains(actual: &str, expected: &str) -> bool {
    actual.contains(expected)
}

fn equals(actual: &str, expected: &str) -> bool {
    actual == expected
}

fn starts_with(actual: &str, expected: &str) -> bool {
    actual.starts_with(expected)
}

fn ends_with(actual: &str, expected: &str) -> bool {
    actual.ends_with(expected)
}

const OPERATORS: [(ConditionOperator, Evaluator); 4] = [
    (ConditionOperator::Contains, contains),
    (ConditionOperator::Equals, equals),
    (ConditionOperator::StartsWith, starts_with),
    (ConditionOperator::EndsWith, ends_with),
];

fn evaluator(operator: ConditionOperator) -> Option<Evaluator> {
    OPERATORS
        .iter()
        .find(|(op, _)| *op == operator)
        .map(|(_, f)| *f)
}

/// Lower-cased value of `field`. `to` is every recipient joined by spaces.
fn field_value(field: ConditionField, message: &NormalizedMessage) -> Option<String> {
    let value = match field {
        ConditionField::Subject => message.subject.to_lowercase(),
        ConditionField::Body => message.plain_body.to_lowercase(),
        ConditionField::From => message.from.to_lowercase(),
        ConditionField::To => message.to.join(" ").to_lowercase(),
        ConditionField::Unknown => return None,
    };
    Some(value)
}

fn condition_holds(condition: &RuleCondition, message: &NormalizedMessage) -> bool {
    let (Some(actual), Some(eval)) = (
        field_value(condition.field, message),
        evaluator(condition.operator),
    ) else {
        return false;
    };

    eval(&actual, &condition.value.to_lowercase())
}

fn rule_matches(rule: &ClassificationRule, message: &NormalizedMessage) -> bool {
    rule.conditions.iter().all(|c| condition_holds(c, message))
}

/// First active rule whose conditions all hold decides the action. No match
/// yields an empty action.
pub fn classify(rules: &[ClassificationRule], message: &NormalizedMessage) -> Action {
    rules
        .iter()
        .filter(|r| r.is_active)
        .find(|r| rule_matches(r, message))
        .map(|r| r.action.clone())
        .unwrap_or_default()
}
