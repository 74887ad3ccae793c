//! Executes a query plan against a read view.

use super::planner::{self, QueryPlan};
use super::IndexQuery;
use crate::error::CoreResult;
use crate::schema::Model;
use bicycle_codec::{tuple_len, Record};
use bicycle_storage::ReadView;

/// A materialized record and its primary-key tuple.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Match {
    pub(crate) pk: Vec<u8>,
    pub(crate) record: Record,
}

/// Offset and limit applied to materialized records, so skipped
/// dangling entries never count.
struct Window {
    skip: usize,
    limit: Option<usize>,
    out: Vec<Match>,
}

impl Window {
    fn new(query: &IndexQuery) -> Self {
        Self {
            skip: query.offset.unwrap_or(0),
            limit: query.limit,
            out: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.out.len() >= limit)
    }

    /// Returns true once the window is full.
    fn offer(&mut self, found: Match) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
        } else {
            self.out.push(found);
        }
        self.is_full()
    }
}

/// Resolves `query` against `view`, in index order with equal index keys
/// in ascending primary-key order.
pub(crate) fn resolve(view: &dyn ReadView, model: &Model, query: &IndexQuery) -> CoreResult<Vec<Match>> {
    let plan = planner::plan(model, query)?;
    let mut window = Window::new(query);
    if window.is_full() {
        return Ok(window.out);
    }

    let regroup = plan.regroups_ties();
    let prefix_len = plan.index.prefix().len();
    let mut tie_key: Vec<u8> = Vec::new();
    let mut ties: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

    let entries = view.scan(plan.range.clone(), plan.direction, None)?;
    for entry in entries {
        let (key, value) = entry?;
        if !regroup {
            if offer(view, model, &plan, key, value, &mut window)? {
                return Ok(window.out);
            }
            continue;
        }

        let orders = plan.index.orders();
        let tuple_end = prefix_len + tuple_len(&key[prefix_len..], orders, orders.len())?;
        if key[..tuple_end] != tie_key[..] {
            if flush(view, model, &plan, &mut ties, &mut window)? {
                return Ok(window.out);
            }
            tie_key = key[..tuple_end].to_vec();
        }
        ties.push((key, value));
    }
    flush(view, model, &plan, &mut ties, &mut window)?;
    Ok(window.out)
}

/// Offers a reverse-scanned run of equal index keys in ascending
/// primary-key order.
fn flush(
    view: &dyn ReadView,
    model: &Model,
    plan: &QueryPlan<'_>,
    ties: &mut Vec<(Vec<u8>, Vec<u8>)>,
    window: &mut Window,
) -> CoreResult<bool> {
    for (key, value) in ties.drain(..).rev() {
        if offer(view, model, plan, key, value, window)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn offer(
    view: &dyn ReadView,
    model: &Model,
    plan: &QueryPlan<'_>,
    key: Vec<u8>,
    value: Vec<u8>,
    window: &mut Window,
) -> CoreResult<bool> {
    match materialize(view, model, plan, key, value)? {
        Some(found) => Ok(window.offer(found)),
        None => Ok(false),
    }
}

fn materialize(
    view: &dyn ReadView,
    model: &Model,
    plan: &QueryPlan<'_>,
    key: Vec<u8>,
    value: Vec<u8>,
) -> CoreResult<Option<Match>> {
    let index = plan.index;
    if index.is_primary() {
        let pk = key[index.prefix().len()..].to_vec();
        let record = model.decode_record(&value)?;
        return Ok(Some(Match { pk, record }));
    }

    match view.get(&model.record_key(&value))? {
        Some(bytes) => Ok(Some(Match {
            record: model.decode_record(&bytes)?,
            pk: value,
        })),
        None => {
            tracing::warn!(
                model = model.name(),
                index = index.name(),
                "skipping index entry whose record is missing"
            );
            Ok(None)
        }
    }
}
