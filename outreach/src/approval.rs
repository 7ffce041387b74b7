//! Explicit operator approval before anything is sent.
//!
//! Nothing leaves the machine without an affirmative answer. The prompt
//! accepts `yes`/`y` and `no`/`n` (case-insensitive); anything else asks
//! again. End of input counts as a refusal, so a disconnected terminal can
//! never approve a send.

use std::io::{BufRead, Write};

use outreach_common::contact::Contact;
use tracing::{info, warn};

/// How many contacts the preview lists.
const PREVIEW_LEN: usize = 5;

/// What the operator is being asked to approve.
#[derive(Clone, Copy, Debug)]
pub struct ApprovalRequest<'a> {
    /// Contacts that will be sent to, in send order.
    pub contacts: &'a [Contact],
    /// Source rows rejected during loading.
    pub rejected: usize,
    /// Subject line of the campaign.
    pub subject: &'a str,
    /// Address the campaign is sent from.
    pub sender: &'a str,
}

/// Prompt until the operator answers yes or no.
///
/// The summary shows the total count, subject, sender, and the first few
/// recipients. A plan of zero contacts is still presented; the operator
/// should learn that the source produced nothing rather than have the run
/// silently no-op.
///
/// # Errors
/// Returns the underlying I/O error when the prompt cannot be written or the
/// answer cannot be read.
pub fn request_approval(
    input: &mut impl BufRead,
    output: &mut impl Write,
    request: &ApprovalRequest<'_>,
) -> std::io::Result<bool> {
    let total = request.contacts.len();

    writeln!(output, "Subject: {}", request.subject)?;
    writeln!(output, "Sender:  {}", request.sender)?;
    writeln!(output, "Recipients: {total} contact(s)")?;
    for contact in request.contacts.iter().take(PREVIEW_LEN) {
        let name = contact.display_name.as_deref().unwrap_or("(no name)");
        writeln!(
            output,
            "  - {name} ({}) <{}>",
            contact.first_name, contact.email
        )?;
    }
    if total > PREVIEW_LEN {
        writeln!(output, "  ... and {} more", total - PREVIEW_LEN)?;
    }
    if request.rejected > 0 {
        writeln!(
            output,
            "{} source row(s) were rejected and will be skipped.",
            request.rejected
        )?;
    }
    writeln!(
        output,
        "WARNING: this will send {total} email(s). This cannot be undone."
    )?;

    loop {
        write!(output, "Proceed? [yes/no]: ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            warn!("input closed before approval; treating as refusal");
            return Ok(false);
        }

        match answer.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => {
                info!(contacts = total, "campaign approved");
                return Ok(true);
            }
            "no" | "n" => {
                info!(contacts = total, "campaign declined");
                return Ok(false);
            }
            other => {
                writeln!(output, "Please answer yes or no (got {other:?}).")?;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use ahash::AHashMap;
    use outreach_common::address::Address;

    use super::*;

    fn contacts(n: usize) -> Vec<Contact> {
        (0..n)
            .map(|i| {
                Contact::new(
                    Address::parse(&format!("c{i}@example.com")).unwrap(),
                    Some(format!("Contact {i}")),
                    "Friend",
                    AHashMap::default(),
                )
            })
            .collect()
    }

    fn ask_with(contacts: &[Contact], answers: &str) -> (bool, String) {
        let request = ApprovalRequest {
            contacts,
            rejected: 1,
            subject: "Hello {first_name}",
            sender: "ops@example.com",
        };
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let approved = request_approval(&mut input, &mut output, &request).unwrap();
        (approved, String::from_utf8(output).unwrap())
    }

    fn ask(answers: &str) -> (bool, String) {
        ask_with(&contacts(3), answers)
    }

    #[test]
    fn test_yes_and_shorthand_approve() {
        assert!(ask("yes\n").0);
        assert!(ask("y\n").0);
        assert!(ask("  YES  \n").0);
    }

    #[test]
    fn test_no_and_shorthand_refuse() {
        assert!(!ask("no\n").0);
        assert!(!ask("n\n").0);
        assert!(!ask("No\n").0);
    }

    #[test]
    fn test_unrecognized_answer_reprompts() {
        let (approved, output) = ask("maybe\nsure\nyes\n");
        assert!(approved);
        assert_eq!(output.matches("Proceed?").count(), 3);
        assert!(output.contains("Please answer yes or no"));
    }

    #[test]
    fn test_eof_refuses() {
        assert!(!ask("").0);
        assert!(!ask("maybe\n").0);
    }

    #[test]
    fn test_summary_shows_plan_and_warning() {
        let (_, output) = ask("no\n");
        assert!(output.contains("Subject: Hello {first_name}"));
        assert!(output.contains("ops@example.com"));
        assert!(output.contains("3 contact(s)"));
        assert!(output.contains("Contact 0 (Contact) <c0@example.com>"));
        assert!(output.contains("1 source row(s)"));
        assert!(output.contains("WARNING: this will send 3 email(s)"));
    }

    #[test]
    fn test_preview_is_capped_at_five() {
        let (_, output) = ask_with(&contacts(8), "no\n");
        assert_eq!(output.matches("  - ").count(), 5);
        assert!(output.contains("... and 3 more"));
    }

    #[test]
    fn test_zero_contacts_still_prompts() {
        let (approved, output) = ask_with(&[], "yes\n");
        assert!(approved);
        assert!(output.contains("0 contact(s)"));
        assert!(output.contains("send 0 email(s)"));
    }
}
