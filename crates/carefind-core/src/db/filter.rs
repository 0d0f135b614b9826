//! Structured provider filters and their SQL rendering.
//!
//! Each recognised filter is one [`FilterClause`] variant; a
//! [`ProviderFilter`] is the AND of the clauses the caller actually supplied.
//! Rendered SQL assumes the `providers` table is aliased as `p` and uses
//! anonymous `?` placeholders, bound in clause order.

use crate::model::{SearchQuery, non_blank};
use rusqlite::types::Value;

/// One supplied filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    /// `address_city` equals the value exactly.
    City(String),
    /// `address_state` equals the value exactly.
    State(String),
    /// `specialty` contains the value, ignoring case (Unicode lowercase).
    SpecialtyContains(String),
    /// `full_name` contains the value, ignoring case (Unicode lowercase).
    NameContains(String),
    AcceptingNewPatients(bool),
    /// `rating >= value`; unrated providers are excluded.
    MinRating(f64),
    /// `insurance_accepted` includes the plan.
    Insurance(String),
    /// `languages` includes the language.
    Language(String),
}

impl FilterClause {
    #[must_use]
    pub const fn sql(&self) -> &'static str {
        match self {
            Self::City(_) => "p.address_city = ?",
            Self::State(_) => "p.address_state = ?",
            Self::SpecialtyContains(_) => "instr(casefold(p.specialty), casefold(?)) > 0",
            Self::NameContains(_) => "instr(casefold(p.full_name), casefold(?)) > 0",
            Self::AcceptingNewPatients(_) => "p.accepting_new_patients = ?",
            Self::MinRating(_) => "p.rating >= ?",
            Self::Insurance(_) => {
                "EXISTS (SELECT 1 FROM provider_insurance pi \
                 WHERE pi.provider_id = p.id AND pi.plan = ?)"
            }
            Self::Language(_) => {
                "EXISTS (SELECT 1 FROM provider_languages pl \
                 WHERE pl.provider_id = p.id AND pl.language = ?)"
            }
        }
    }

    #[must_use]
    pub fn param(&self) -> Value {
        match self {
            Self::City(v)
            | Self::State(v)
            | Self::SpecialtyContains(v)
            | Self::NameContains(v)
            | Self::Insurance(v)
            | Self::Language(v) => Value::Text(v.clone()),
            Self::AcceptingNewPatients(flag) => Value::Integer(i64::from(*flag)),
            Self::MinRating(threshold) => Value::Real(*threshold),
        }
    }

    /// Field name as exposed to callers, for logging.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::City(_) => "city",
            Self::State(_) => "state",
            Self::SpecialtyContains(_) => "specialty",
            Self::NameContains(_) => "name_contains",
            Self::AcceptingNewPatients(_) => "accepting_new_patients",
            Self::MinRating(_) => "min_rating",
            Self::Insurance(_) => "insurance",
            Self::Language(_) => "language",
        }
    }
}

/// Conjunction of supplied filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderFilter {
    clauses: Vec<FilterClause>,
}

impl ProviderFilter {
    /// Collect the clauses a query supplies. Blank strings impose nothing.
    #[must_use]
    pub fn from_query(query: &SearchQuery) -> Self {
        let text = |value: &Option<String>| non_blank(value.as_deref()).map(str::to_owned);

        let mut clauses = Vec::new();
        if let Some(city) = text(&query.city) {
            clauses.push(FilterClause::City(city));
        }
        if let Some(state) = text(&query.state) {
            clauses.push(FilterClause::State(state));
        }
        if let Some(specialty) = text(&query.specialty) {
            clauses.push(FilterClause::SpecialtyContains(specialty));
        }
        if let Some(name) = text(&query.name_contains) {
            clauses.push(FilterClause::NameContains(name));
        }
        if let Some(flag) = query.accepting_new_patients {
            clauses.push(FilterClause::AcceptingNewPatients(flag));
        }
        if let Some(threshold) = query.min_rating {
            clauses.push(FilterClause::MinRating(threshold));
        }
        if let Some(plan) = text(&query.insurance) {
            clauses.push(FilterClause::Insurance(plan));
        }
        if let Some(language) = text(&query.language) {
            clauses.push(FilterClause::Language(language));
        }

        Self { clauses }
    }

    #[must_use]
    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// `WHERE a AND b ...`, or an empty string when nothing was supplied.
    #[must_use]
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            return String::new();
        }
        let joined = self
            .clauses
            .iter()
            .map(FilterClause::sql)
            .collect::<Vec<_>>()
            .join(" AND ");
        format!("WHERE {joined}")
    }

    /// Bind values, in the same order as the placeholders of [`Self::where_sql`].
    #[must_use]
    pub fn params(&self) -> Vec<Value> {
        self.clauses.iter().map(FilterClause::param).collect()
    }

    /// Field names of the supplied clauses, for logging.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        self.clauses.iter().map(FilterClause::field).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_has_no_where_clause() {
        let filter = ProviderFilter::from_query(&SearchQuery::default());
        assert!(filter.is_empty());
        assert_eq!(filter.where_sql(), "");
        assert!(filter.params().is_empty());
    }

    #[test]
    fn blank_strings_impose_no_constraint() {
        let query = SearchQuery {
            city: Some("  ".into()),
            language: Some(String::new()),
            ..SearchQuery::default()
        };
        assert!(ProviderFilter::from_query(&query).is_empty());
    }

    #[test]
    fn supplied_filters_render_as_conjunction_in_order() {
        let query = SearchQuery {
            city: Some("Austin".into()),
            specialty: Some("cardio".into()),
            accepting_new_patients: Some(true),
            min_rating: Some(4.0),
            language: Some("Spanish".into()),
            ..SearchQuery::default()
        };
        let filter = ProviderFilter::from_query(&query);

        assert_eq!(
            filter.fields(),
            vec![
                "city",
                "specialty",
                "accepting_new_patients",
                "min_rating",
                "language"
            ]
        );
        let sql = filter.where_sql();
        assert!(sql.starts_with("WHERE p.address_city = ? AND instr("));
        assert_eq!(sql.matches(" AND ").count(), 5, "4 joins + 1 inside EXISTS");
        assert_eq!(sql.matches('?').count(), filter.params().len());
        assert_eq!(
            filter.params(),
            vec![
                Value::Text("Austin".into()),
                Value::Text("cardio".into()),
                Value::Integer(1),
                Value::Real(4.0),
                Value::Text("Spanish".into()),
            ]
        );
    }

    #[test]
    fn text_filters_are_trimmed() {
        let query = SearchQuery {
            state: Some(" TX ".into()),
            ..SearchQuery::default()
        };
        assert_eq!(
            ProviderFilter::from_query(&query).clauses(),
            &[FilterClause::State("TX".into())]
        );
    }

    #[test]
    fn accepting_false_is_still_a_filter() {
        let query = SearchQuery {
            accepting_new_patients: Some(false),
            ..SearchQuery::default()
        };
        assert_eq!(
            ProviderFilter::from_query(&query).params(),
            vec![Value::Integer(0)]
        );
    }
}
