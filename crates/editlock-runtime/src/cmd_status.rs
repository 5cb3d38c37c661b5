//! `editlock status`: one-shot lock holder lookup.

use editlock_client::LeaseClient;
use editlock_core::{DocumentId, Participant, PollOutcome, Role};

use crate::cli::StatusOpts;

pub async fn cmd_status(opts: StatusOpts) -> anyhow::Result<()> {
    let transport = opts.server.transport()?;
    // Status never acts on the lease, so no identity is needed.
    let client = LeaseClient::new(transport, Participant::new("", "", Role::Member));
    let document = DocumentId::new(opts.document);
    let outcome = client.status(&document).await;
    if let PollOutcome::Unknown(reason) = &outcome {
        anyhow::bail!("lock status of {document} unavailable: {reason}");
    }
    println!("{}", format_status(&document, &outcome, opts.json));
    Ok(())
}

pub(crate) fn format_status(document: &DocumentId, outcome: &PollOutcome, json: bool) -> String {
    let holder = match outcome {
        PollOutcome::Holder(holder) => holder.as_ref(),
        PollOutcome::Unknown(_) => None,
    };
    if json {
        let value = serde_json::json!({
            "document_id": document,
            "locked": holder.is_some(),
            "holder": holder,
        });
        return value.to_string();
    }
    match holder {
        Some(h) => match h.acquired_at {
            Some(at) => format!(
                "{document} is being edited by {} since {}",
                h.display_name,
                at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => format!("{document} is being edited by {}", h.display_name),
        },
        None => format!("{document} is not locked"),
    }
}
