//! Index selection and key bounds.

use super::{IndexQuery, Op, OrderBy};
use crate::error::{CoreResult, QueryError};
use crate::schema::{FieldType, IndexLayout, Model};
use bicycle_codec::{encode_prefix, encode_value, prefix_successor, SortOrder, Value};
use bicycle_storage::{Direction, KeyRange};

/// How a query will be executed.
#[derive(Debug)]
pub(crate) struct QueryPlan<'m> {
    /// Index to scan.
    pub(crate) index: &'m IndexLayout,
    /// Keys to scan.
    pub(crate) range: KeyRange,
    /// Scan direction.
    pub(crate) direction: Direction,
}

impl QueryPlan<'_> {
    /// Reverse scans of a secondary index meet equal index tuples in
    /// descending primary-key order; those runs must be flipped.
    pub(crate) fn regroups_ties(&self) -> bool {
        self.direction.is_reverse() && !self.index.is_primary()
    }
}

/// Constraints on one field after grouping.
#[derive(Debug)]
struct FieldBounds<'q> {
    field: &'q str,
    eq: Option<Value>,
    lower: Option<(Value, bool)>,
    upper: Option<(Value, bool)>,
    prefix: Option<Value>,
}

impl<'q> FieldBounds<'q> {
    fn new(field: &'q str) -> Self {
        Self {
            field,
            eq: None,
            lower: None,
            upper: None,
            prefix: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.eq.is_none() && self.lower.is_none() && self.upper.is_none() && self.prefix.is_none()
    }

    fn add(&mut self, op: Op, value: Value) -> Result<(), QueryError> {
        let field = self.field;
        let clash = || QueryError::invalid(field, format!("`{op}` conflicts with another constraint"));
        match op {
            Op::Eq | Op::BeginsWith if !self.is_empty() => return Err(clash()),
            Op::Eq => self.eq = Some(value),
            Op::BeginsWith => self.prefix = Some(value),
            _ if self.eq.is_some() || self.prefix.is_some() => return Err(clash()),
            Op::Gt | Op::Gte if self.lower.is_some() => return Err(clash()),
            Op::Lt | Op::Lte if self.upper.is_some() => return Err(clash()),
            Op::Gt | Op::Gte => self.lower = Some((value, op == Op::Gte)),
            Op::Lt | Op::Lte => self.upper = Some((value, op == Op::Lte)),
        }
        Ok(())
    }
}

/// Chooses an index for `query` and computes its scan range.
pub(crate) fn plan<'m>(model: &'m Model, query: &IndexQuery) -> CoreResult<QueryPlan<'m>> {
    let groups = group_constraints(model, query)?;

    let (eq_fields, ranged): (Vec<&FieldBounds<'_>>, Vec<&FieldBounds<'_>>) =
        groups.iter().partition(|g| g.eq.is_some());
    if let Some(second) = ranged.get(1) {
        return Err(QueryError::invalid(
            second.field,
            format!("only one field may carry a range, `{}` already does", ranged[0].field),
        )
        .into());
    }
    let range_field = ranged.first().copied();
    let eq_names: Vec<&str> = eq_fields.iter().map(|g| g.field).collect();

    if let Some(order) = &query.order {
        if model.field(&order.field).is_none() {
            return Err(unknown_field(model, &order.field).into());
        }
    }

    let candidates: Vec<&IndexLayout> = std::iter::once(model.primary_key())
        .chain(by_preference(model.indexes()))
        .filter(|index| covers(index, &eq_names, range_field.map(|g| g.field)))
        .collect();
    if candidates.is_empty() {
        return Err(QueryError::NoMatchingIndex {
            model: model.name().to_owned(),
            fields: groups.iter().map(|g| g.field.to_owned()).collect(),
        }
        .into());
    }

    let (index, direction) = candidates
        .iter()
        .find_map(|index| {
            scan_direction(index, &eq_names, query.order.as_ref()).map(|d| (*index, d))
        })
        .ok_or_else(|| QueryError::UnsupportedOrder {
            field: query
                .order
                .as_ref()
                .map(|o| o.field.clone())
                .unwrap_or_default(),
        })?;

    let mut prefix = index.prefix().to_vec();
    for (field, &order) in index.fields().iter().zip(index.orders()).take(eq_names.len()) {
        let value = eq_fields
            .iter()
            .find(|g| g.field == field.as_str())
            .and_then(|g| g.eq.as_ref())
            .unwrap_or(&Value::Null);
        encode_value(value, order, &mut prefix)?;
    }

    let range = match range_field {
        None => KeyRange::prefix(&prefix),
        Some(bounds) => {
            let order = index.orders()[eq_names.len()];
            range_span(&prefix, order, bounds)?.into_range()
        }
    };

    tracing::trace!(
        model = model.name(),
        index = index.name(),
        reverse = direction.is_reverse(),
        "query planned"
    );
    Ok(QueryPlan {
        index,
        range,
        direction,
    })
}

fn unknown_field(model: &Model, field: &str) -> QueryError {
    QueryError::UnknownField {
        model: model.name().to_owned(),
        field: field.to_owned(),
    }
}

fn group_constraints<'q>(model: &Model, query: &'q IndexQuery) -> CoreResult<Vec<FieldBounds<'q>>> {
    let mut groups: Vec<FieldBounds<'q>> = Vec::new();
    for constraint in &query.constraints {
        let name = constraint.field.as_str();
        let Some(def) = model.field(name) else {
            return Err(unknown_field(model, name).into());
        };
        if def.ty == FieldType::Record {
            return Err(QueryError::invalid(name, "nested fields cannot be constrained").into());
        }

        let value = match constraint.op {
            Op::Eq => def.ty.coerce(name, true, constraint.value.clone())?,
            _ if constraint.value.is_null() => {
                return Err(QueryError::invalid(
                    name,
                    format!("`{}` needs a non-null operand", constraint.op),
                )
                .into())
            }
            Op::BeginsWith if !matches!(def.ty, FieldType::Text | FieldType::Bytes) => {
                return Err(QueryError::invalid(
                    name,
                    format!("`begins_with` needs a text or bytes field, not {}", def.ty),
                )
                .into())
            }
            _ => def.ty.coerce(name, false, constraint.value.clone())?,
        };

        let slot = match groups.iter().position(|g| g.field == name) {
            Some(slot) => slot,
            None => {
                groups.push(FieldBounds::new(name));
                groups.len() - 1
            }
        };
        groups[slot].add(constraint.op, value)?;
    }
    Ok(groups)
}

/// Secondary indexes in selection order: unique first, then fewer
/// fields, then declaration order.
fn by_preference(indexes: &[IndexLayout]) -> Vec<&IndexLayout> {
    let mut ordered: Vec<&IndexLayout> = indexes.iter().collect();
    ordered.sort_by_key(|index| (!index.is_unique(), index.fields().len()));
    ordered
}

/// True if the leading fields of `index` are exactly the equality fields
/// in any order, followed by the range field if there is one.
fn covers(index: &IndexLayout, eq_fields: &[&str], range_field: Option<&str>) -> bool {
    let fields = index.fields();
    let needed = eq_fields.len() + usize::from(range_field.is_some());
    if fields.len() < needed {
        return false;
    }
    let head_ok = fields[..eq_fields.len()]
        .iter()
        .all(|f| eq_fields.contains(&f.as_str()));
    let range_ok = range_field.map_or(true, |r| fields[eq_fields.len()] == r);
    head_ok && range_ok
}

/// Direction that yields `order` from `index`, or `None` if it cannot.
fn scan_direction(index: &IndexLayout, eq_fields: &[&str], order: Option<&OrderBy>) -> Option<Direction> {
    let Some(order) = order else {
        return Some(Direction::Forward);
    };
    if eq_fields.contains(&order.field.as_str()) {
        return Some(Direction::Forward);
    }
    let next = eq_fields.len();
    if index.fields().get(next) != Some(&order.field) {
        return None;
    }
    if index.orders()[next] == order.direction {
        Some(Direction::Forward)
    } else {
        Some(Direction::Reverse)
    }
}

/// Half-open key interval `[lower, upper)`.
#[derive(Debug)]
struct Span {
    lower: Vec<u8>,
    upper: Option<Vec<u8>>,
    empty: bool,
}

impl Span {
    fn within(prefix: &[u8]) -> Self {
        Self {
            lower: prefix.to_vec(),
            upper: prefix_successor(prefix),
            empty: false,
        }
    }

    fn start_at(&mut self, key: Vec<u8>) {
        if key > self.lower {
            self.lower = key;
        }
    }

    /// Starts after every key beginning with `key`.
    fn start_after(&mut self, key: &[u8]) {
        match prefix_successor(key) {
            Some(next) => self.start_at(next),
            None => self.empty = true,
        }
    }

    fn end_before(&mut self, key: Vec<u8>) {
        if self.upper.as_ref().map_or(true, |upper| key < *upper) {
            self.upper = Some(key);
        }
    }

    /// Ends after every key beginning with `key`.
    fn end_after(&mut self, key: &[u8]) {
        if let Some(next) = prefix_successor(key) {
            self.end_before(next);
        }
    }

    fn into_range(self) -> KeyRange {
        if self.empty {
            return KeyRange::half_open(self.lower.clone(), Some(self.lower));
        }
        KeyRange::half_open(self.lower, self.upper)
    }
}

/// Bounds for the field right after the equality prefix. Descending
/// components store complemented bytes, so logical lower bounds become
/// key upper bounds and nulls sort last instead of first.
fn range_span(prefix: &[u8], order: SortOrder, bounds: &FieldBounds<'_>) -> CoreResult<Span> {
    let point = |value: &Value| -> CoreResult<Vec<u8>> {
        let mut key = prefix.to_vec();
        encode_value(value, order, &mut key)?;
        Ok(key)
    };

    if let Some(value) = &bounds.prefix {
        let mut key = prefix.to_vec();
        encode_prefix(value, order, &mut key)?;
        return Ok(Span::within(&key));
    }

    let ascending = order == SortOrder::Ascending;
    let mut span = Span::within(prefix);

    let null = point(&Value::Null)?;
    if ascending {
        span.start_after(&null);
    } else {
        span.end_before(null);
    }

    if let Some((value, inclusive)) = &bounds.lower {
        let key = point(value)?;
        match (ascending, *inclusive) {
            (true, true) => span.start_at(key),
            (true, false) => span.start_after(&key),
            (false, true) => span.end_after(&key),
            (false, false) => span.end_before(key),
        }
    }
    if let Some((value, inclusive)) = &bounds.upper {
        let key = point(value)?;
        match (ascending, *inclusive) {
            (true, true) => span.end_after(&key),
            (true, false) => span.end_before(key),
            (false, true) => span.start_at(key),
            (false, false) => span.start_after(&key),
        }
    }
    Ok(span)
}
