use alertrelay_common::types::RecipientUser;
use std::collections::HashSet;

/// Which contact data a channel delivers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientKind {
    Email,
    Phone,
    /// A credential from each user's `contacts` map, e.g. a robot token.
    /// With `mention_phones`, user phones are also collected for
    /// at-mentions.
    Contact { key: String, mention_phones: bool },
}

/// Deduplicated delivery targets for one channel, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet {
    targets: Vec<String>,
    mentions: Vec<String>,
}

impl RecipientSet {
    pub fn new<T, M>(targets: T, mentions: M) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        Self {
            targets: distinct(targets),
            mentions: distinct(mentions),
        }
    }

    /// Addresses, phone numbers, or tokens to deliver to.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Phone numbers to at-mention inside the delivered message.
    pub fn mentions(&self) -> &[String] {
        &self.mentions
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }
}

/// Extracts the delivery targets of `kind` from `users`.
///
/// Never fails: absent or blank fields are skipped, and an empty set means
/// the channel has nothing to do.
///
/// # Examples
///
/// ```
/// use alertrelay_common::types::RecipientUser;
/// use alertrelay_notify::recipients::{resolve, RecipientKind};
///
/// let users = vec![
///     RecipientUser { email: Some("a@x.io".into()), ..Default::default() },
///     RecipientUser { email: Some("a@x.io".into()), ..Default::default() },
///     RecipientUser { email: Some("".into()), ..Default::default() },
/// ];
/// assert_eq!(resolve(&users, &RecipientKind::Email).targets(), ["a@x.io"]);
/// ```
pub fn resolve(users: &[RecipientUser], kind: &RecipientKind) -> RecipientSet {
    let phones = || users.iter().filter_map(|u| u.phone.as_deref());
    match kind {
        RecipientKind::Email => {
            RecipientSet::new(users.iter().filter_map(|u| u.email.as_deref()), [""; 0])
        }
        RecipientKind::Phone => RecipientSet::new(phones(), [""; 0]),
        RecipientKind::Contact {
            key,
            mention_phones,
        } => {
            let tokens = users.iter().map(|u| u.contact(key));
            if *mention_phones {
                RecipientSet::new(tokens, phones())
            } else {
                RecipientSet::new(tokens, [""; 0])
            }
        }
    }
}

fn distinct<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in values {
        let v = v.as_ref().trim();
        if !v.is_empty() && seen.insert(v.to_string()) {
            out.push(v.to_string());
        }
    }
    out
}
