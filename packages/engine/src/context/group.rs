//! Fan-out and fan-in of concurrency groups.

use futures_util::future::join_all;
use iosp_core::{AnyResponse, Response, ResultCode};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use super::block::{BlockKind, ExecutionBlock, GroupId, SingleFactory};
use super::cache::ResponseCache;
use super::{CommandIds, ExecutionError};
use crate::dispatch::Dispatcher;

/// Dispatches every block of `group` concurrently and folds the members into
/// one aggregate response.
///
/// Members start in insertion order and all of them are awaited, so a slow or
/// failing member never cancels its siblings. The aggregate keeps the raw
/// members in insertion order; a member rejected by one of its checks is
/// `None`.
///
/// # Errors
///
/// Returns the first member fault (dispatch error or panic) in insertion
/// order, after every member has finished.
pub(super) async fn dispatch_group<D>(
    blocks: &[ExecutionBlock],
    group: GroupId,
    cache: &ResponseCache,
    dispatcher: &D,
    ids: &mut CommandIds<'_>,
) -> Result<AnyResponse, ExecutionError>
where
    D: Dispatcher + ?Sized,
{
    let members: Vec<(&ExecutionBlock, &SingleFactory)> = blocks
        .iter()
        .filter_map(|block| match &block.kind {
            BlockKind::Grouped { group: g, factory } if *g == group => Some((block, factory)),
            _ => None,
        })
        .collect();
    let Some((first, _)) = members.first() else {
        return Ok(AnyResponse::group(Response::success(), Vec::new()));
    };
    let label = first.label();

    let span = info_span!("group", group = %group, name = %label, members = members.len());
    let handles: Vec<Option<JoinHandle<_>>> = span.in_scope(|| {
        members
            .iter()
            .map(|(block, factory)| {
                if !block.passes_before_check(cache) {
                    debug!(block = %block.label(), "group member rejected by before check");
                    return None;
                }
                let command = ids.command(factory(cache), block);
                let member_span = info_span!("group_member", index = block.index);
                Some(tokio::spawn(dispatcher.dispatch(command).instrument(member_span)))
            })
            .collect()
    });

    let joined = join_all(handles.into_iter().map(|handle| async move {
        match handle {
            Some(handle) => Some(handle.await),
            None => None,
        }
    }))
    .instrument(span.clone())
    .await;

    let mut results = Vec::with_capacity(joined.len());
    for ((block, _), outcome) in members.iter().zip(joined) {
        let result = match outcome {
            None => None,
            Some(Err(source)) => {
                return Err(ExecutionError::MemberPanicked {
                    block: block.label(),
                    source,
                })
            }
            Some(Ok(Err(source))) => {
                return Err(ExecutionError::Dispatch {
                    block: block.label(),
                    source,
                })
            }
            Some(Ok(Ok(response))) => {
                if block.passes_after_check(&response) {
                    Some(response)
                } else {
                    debug!(block = %block.label(), "group member rejected by after check");
                    None
                }
            }
        };
        results.push(result);
    }

    Ok(aggregate(first.name(), &label, results))
}

/// Builds the group response from its members.
///
/// Rejected members neither fail the group nor add to its message. Member
/// interrupt flags stay on the members.
fn aggregate(name: Option<&str>, label: &str, members: Vec<Option<AnyResponse>>) -> AnyResponse {
    let errors: Vec<String> = members
        .iter()
        .flatten()
        .filter(|resp| !resp.succeeded())
        .map(|resp| {
            resp.message()
                .map_or_else(|| resp.result_code().to_string(), str::to_owned)
        })
        .collect();

    let mut status = if errors.is_empty() {
        Response::success()
    } else {
        warn!(group = %label, failed = errors.len(), "parallel requests failed");
        Response::failure(ResultCode::FailureBadRequest, errors.join(" - "))
    };
    status.count = members.len();
    status.info = name.map(str::to_owned);

    AnyResponse::group(status, members)
}

#[cfg(test)]
mod tests {
    use iosp_core::TypedResponse;

    use super::*;

    #[test]
    fn aggregate_of_successes_is_success() {
        let members = vec![
            Some(TypedResponse::success(1_u8).into()),
            Some(TypedResponse::success(2_u8).into()),
        ];
        let agg = aggregate(Some("pair"), "pair", members);
        assert_eq!(agg.result_code(), ResultCode::Success);
        assert_eq!(agg.info(), Some("pair"));
        assert_eq!(agg.count(), 2);
        assert!(agg.message().is_none());
        assert_eq!(agg.into_list::<u8>(), Some(vec![1, 2]));
    }

    #[test]
    fn aggregate_joins_failure_messages() {
        let members = vec![
            Some(Response::failure(ResultCode::FailureNotFound, "x not found").into()),
            Some(Response::success().into()),
            Some(Response::new(ResultCode::FailureForbidden).into()),
            None,
        ];
        let agg = aggregate(None, "#2", members);
        assert_eq!(agg.result_code(), ResultCode::FailureBadRequest);
        assert_eq!(agg.message(), Some("x not found - failure_forbidden"));
        assert_eq!(agg.members().map(<[_]>::len), Some(4));
    }

    #[test]
    fn aggregate_of_rejected_members_is_success() {
        let agg = aggregate(Some("fan"), "fan", vec![None, None]);
        assert!(agg.succeeded());
        assert!(agg.message().is_none());
        assert_eq!(agg.count(), 2);
    }

    #[test]
    fn aggregate_leaves_member_interrupt_on_members() {
        let members = vec![
            Some(Response::success().into()),
            Some(Response::success().interrupted().into()),
        ];
        let agg = aggregate(Some("g"), "g", members);
        assert!(agg.succeeded());
        assert!(!agg.interrupt());
        let flagged = agg.members().and_then(|m| m[1].as_ref()).map(AnyResponse::interrupt);
        assert_eq!(flagged, Some(true));
    }
}
