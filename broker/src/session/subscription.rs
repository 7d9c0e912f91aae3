use mossmq_codec::packet::SubscribeOptions;

/// One entry in a session's subscription list (spec §3: "subscription
/// entries with share-name, topic-filter, no-local flag,
/// retain-as-published, retain-handling mode").
#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub filter: String,
    pub share_name: Option<String>,
    pub options: SubscribeOptions,
    pub subscription_identifier: Option<u32>,
}

impl Subscription {
    #[must_use]
    pub fn new(filter: String, options: SubscribeOptions, subscription_identifier: Option<u32>) -> Self {
        let (share_name, filter) = split_share(&filter);
        Subscription {
            filter,
            share_name,
            options,
            subscription_identifier,
        }
    }
}

/// Splits a `$share/<group>/<filter>` subscription into its group name and
/// the remaining filter. Filters without the `$share/` prefix are returned
/// unchanged with `share_name = None`.
fn split_share(raw: &str) -> (Option<String>, String) {
    if let Some(rest) = raw.strip_prefix("$share/") {
        if let Some((group, filter)) = rest.split_once('/') {
            return (Some(group.to_string()), filter.to_string());
        }
    }
    (None, raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_subscription_filter_is_split() {
        let (group, filter) = split_share("$share/workers/job/+");
        assert_eq!(group.as_deref(), Some("workers"));
        assert_eq!(filter, "job/+");
    }

    #[test]
    fn plain_filter_has_no_share_group() {
        let (group, filter) = split_share("job/+");
        assert_eq!(group, None);
        assert_eq!(filter, "job/+");
    }
}
