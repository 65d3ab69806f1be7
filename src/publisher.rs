//! Artifact publishing.
//!
//! Pushes one build's output into the target repository with the round
//! policy applied: a fresh build replays attachments (binary ones twice,
//! native plus a base64 backup), a revision only rewrites the generated
//! files. Both rounds end with the license commit.

use crate::attachments::SavedAttachment;
use crate::generator::GeneratedSite;
use crate::github::{RepoHandle, RepoService};
use crate::license::mit_license_text;
use crate::request::Round;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fs;

/// Extensions committed as text even when the declared mime is not `text/*`.
const TEXT_EXTENSIONS: [&str; 4] = [".md", ".csv", ".json", ".txt"];

/// Whether an attachment should be committed through the text path.
pub fn is_text_attachment(name: &str, mime: &str) -> bool {
    mime.starts_with("text")
        || TEXT_EXTENSIONS
            .iter()
            .any(|ext| name.to_lowercase().ends_with(ext))
}

/// Publish a generated site into the repository per the round policy.
///
/// Attachment commit failures are contained per item; generated-file and
/// license commit failures propagate, since a build with missing core
/// files is not worth reporting as done.
pub async fn publish(
    repos: &dyn RepoService,
    repo: &RepoHandle,
    site: &GeneratedSite,
    round: Round,
    license_holder: &str,
) -> anyhow::Result<()> {
    match round {
        Round::Fresh => {
            publish_attachments(repos, repo, &site.attachments).await;
            for (name, content) in &site.files {
                repos
                    .upsert_text_file(repo, name, content, &format!("Add/Update {}", name))
                    .await?;
            }
        }
        Round::Revision => {
            for (name, content) in &site.files {
                repos
                    .upsert_text_file(repo, name, content, &format!("Update {} for round 2", name))
                    .await?;
            }
        }
    }

    repos
        .upsert_text_file(repo, "LICENSE", &mit_license_text(license_holder), "Add MIT license")
        .await?;
    Ok(())
}

/// Replay every materialized attachment into the repository. One failing
/// attachment is logged and skipped; the rest still land.
async fn publish_attachments(
    repos: &dyn RepoService,
    repo: &RepoHandle,
    attachments: &[SavedAttachment],
) {
    for attachment in attachments {
        if let Err(err) = publish_one_attachment(repos, repo, attachment).await {
            tracing::warn!(name = %attachment.name, error = %err, "Attachment commit failed");
        }
    }
}

async fn publish_one_attachment(
    repos: &dyn RepoService,
    repo: &RepoHandle,
    attachment: &SavedAttachment,
) -> anyhow::Result<()> {
    let bytes = fs::read(&attachment.path)?;

    if is_text_attachment(&attachment.name, &attachment.mime) {
        let text = String::from_utf8_lossy(&bytes);
        repos
            .upsert_text_file(
                repo,
                &attachment.name,
                &text,
                &format!("Add attachment {}", attachment.name),
            )
            .await?;
    } else {
        repos
            .upsert_binary_file(
                repo,
                &attachment.name,
                &bytes,
                &format!("Add binary {}", attachment.name),
            )
            .await?;

        // Backup copy so the content survives hosting layers that refuse
        // to serve binaries.
        let encoded = STANDARD.encode(&bytes);
        repos
            .upsert_text_file(
                repo,
                &format!("attachments/{}.b64", attachment.name),
                &encoded,
                &format!("Backup {}.b64", attachment.name),
            )
            .await?;
    }
    Ok(())
}

/// Public Pages URL for a task under the given account.
pub fn pages_url_for(username: &str, task: &str) -> String {
    format!("https://{}.github.io/{}/", username, task)
}
