//! Attribute diff and update-vs-replace policy
//!
//! Each resource type registers a table of field rules. A rule says how a
//! change to one field can be satisfied: in place, by destroy-recreate, or
//! not at all (the remote side ignores the field).

use crate::action::ActionType;
use std::sync::Arc;

/// How a change to a single field is satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    /// The change has no remote effect
    Ignore,
    /// Satisfiable with an in-place update call
    Update,
    /// Requires destroy-then-recreate
    Replace,
}

/// Result of planning a change from an old to a new attribute set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    NoOp,
    /// Update in place; lists the changed updatable fields
    Update(Vec<&'static str>),
    /// Destroy and recreate; lists the fields forcing replacement
    Replace(Vec<&'static str>),
}

impl PlanDecision {
    pub fn action_type(&self) -> ActionType {
        match self {
            PlanDecision::NoOp => ActionType::NoOp,
            PlanDecision::Update(_) => ActionType::Update,
            PlanDecision::Replace(_) => ActionType::Replace,
        }
    }

    /// Fields involved in the decision
    pub fn fields(&self) -> &[&'static str] {
        match self {
            PlanDecision::NoOp => &[],
            PlanDecision::Update(fields) | PlanDecision::Replace(fields) => fields,
        }
    }
}

type ChangeFn<A> = Arc<dyn Fn(&A, &A) -> FieldChange + Send + Sync>;

/// One row of a plan policy table
pub struct FieldRule<A> {
    pub field: &'static str,
    changed: fn(&A, &A) -> bool,
    change: ChangeFn<A>,
}

impl<A> Clone for FieldRule<A> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            changed: self.changed,
            change: Arc::clone(&self.change),
        }
    }
}

/// Table-driven update-vs-replace policy for one resource type
pub struct PlanPolicy<A> {
    rules: Vec<FieldRule<A>>,
}

impl<A> Clone for PlanPolicy<A> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
        }
    }
}

impl<A> Default for PlanPolicy<A> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<A> std::fmt::Debug for PlanPolicy<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanPolicy")
            .field(
                "fields",
                &self.rules.iter().map(|r| r.field).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<A> PlanPolicy<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule whose outcome depends on the old and new values
    pub fn rule(
        mut self,
        field: &'static str,
        changed: fn(&A, &A) -> bool,
        change: impl Fn(&A, &A) -> FieldChange + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(FieldRule {
            field,
            changed,
            change: Arc::new(change),
        });
        self
    }

    /// Any change to `field` forces destroy-recreate
    pub fn replace_on(self, field: &'static str, changed: fn(&A, &A) -> bool) -> Self {
        self.rule(field, changed, |_, _| FieldChange::Replace)
    }

    /// Any change to `field` is applied in place
    pub fn update_on(self, field: &'static str, changed: fn(&A, &A) -> bool) -> Self {
        self.rule(field, changed, |_, _| FieldChange::Update)
    }

    /// Field names covered by the table, in registration order
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.field)
    }

    /// Decide how to move from `old` to `new`
    ///
    /// A single replacing field wins over any number of updatable ones.
    pub fn plan(&self, old: &A, new: &A) -> PlanDecision {
        let mut replace = Vec::new();
        let mut update = Vec::new();

        for rule in &self.rules {
            if !(rule.changed)(old, new) {
                continue;
            }
            match (rule.change)(old, new) {
                FieldChange::Replace => replace.push(rule.field),
                FieldChange::Update => update.push(rule.field),
                FieldChange::Ignore => {}
            }
        }

        if !replace.is_empty() {
            PlanDecision::Replace(replace)
        } else if !update.is_empty() {
            PlanDecision::Update(update)
        } else {
            PlanDecision::NoOp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Bucket {
        region: String,
        label: String,
        size: u32,
    }

    fn bucket(region: &str, label: &str, size: u32) -> Bucket {
        Bucket {
            region: region.to_string(),
            label: label.to_string(),
            size,
        }
    }

    fn policy(size_in_place: bool) -> PlanPolicy<Bucket> {
        PlanPolicy::<Bucket>::new()
            .replace_on("region", |o, n| o.region != n.region)
            .rule(
                "size",
                |o, n| o.size != n.size,
                move |o, n| {
                    if n.size < o.size || !size_in_place {
                        FieldChange::Replace
                    } else {
                        FieldChange::Update
                    }
                },
            )
            .update_on("label", |o, n| o.label != n.label)
    }

    #[test]
    fn test_no_changes_is_noop() {
        let a = bucket("tk1a", "logs", 10);
        assert_eq!(policy(true).plan(&a, &a.clone()), PlanDecision::NoOp);
    }

    #[test]
    fn test_updatable_fields_collected() {
        let old = bucket("tk1a", "logs", 10);
        let new = bucket("tk1a", "audit", 20);
        assert_eq!(
            policy(true).plan(&old, &new),
            PlanDecision::Update(vec!["size", "label"])
        );
    }

    #[test]
    fn test_replace_wins_over_update() {
        let old = bucket("tk1a", "logs", 10);
        let new = bucket("is1a", "audit", 10);
        let decision = policy(true).plan(&old, &new);
        assert_eq!(decision, PlanDecision::Replace(vec!["region"]));
        assert_eq!(decision.action_type(), ActionType::Replace);
    }

    #[test]
    fn test_rule_outcome_depends_on_values() {
        let old = bucket("tk1a", "logs", 10);
        assert_eq!(
            policy(true).plan(&old, &bucket("tk1a", "logs", 5)),
            PlanDecision::Replace(vec!["size"])
        );
        assert_eq!(
            policy(false).plan(&old, &bucket("tk1a", "logs", 20)),
            PlanDecision::Replace(vec!["size"])
        );
    }

    #[test]
    fn test_ignored_change_is_noop() {
        let policy = PlanPolicy::<Bucket>::new().rule(
            "label",
            |o, n| o.label != n.label,
            |_, _| FieldChange::Ignore,
        );
        let decision = policy.plan(&bucket("tk1a", "a", 1), &bucket("tk1a", "b", 1));
        assert_eq!(decision, PlanDecision::NoOp);
        assert!(decision.fields().is_empty());
    }
}
