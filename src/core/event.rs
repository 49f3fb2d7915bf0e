/// A membership change observed by the local node.
///
/// Each event names the reporting node (`from`) and the member it is about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipEvent {
    MemberJoined(MemberChange),
    MemberLeft(MemberChange),
    MemberExpired(MemberChange),
    MemberSuspected(MemberChange),
    MemberRecovered(MemberChange),
    MemberFailed(MemberChange),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberChange {
    pub from: String,
    pub member: String,
}

impl MemberChange {
    fn new(from: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            member: member.into(),
        }
    }
}

impl MembershipEvent {
    pub(crate) fn new_member_joined(from: impl Into<String>, member: impl Into<String>) -> Self {
        MembershipEvent::MemberJoined(MemberChange::new(from, member))
    }

    pub(crate) fn new_member_left(from: impl Into<String>, member: impl Into<String>) -> Self {
        MembershipEvent::MemberLeft(MemberChange::new(from, member))
    }

    pub(crate) fn new_member_expired(from: impl Into<String>, member: impl Into<String>) -> Self {
        MembershipEvent::MemberExpired(MemberChange::new(from, member))
    }

    pub(crate) fn new_member_suspected(
        from: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        MembershipEvent::MemberSuspected(MemberChange::new(from, member))
    }

    pub(crate) fn new_member_recovered(
        from: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        MembershipEvent::MemberRecovered(MemberChange::new(from, member))
    }

    pub(crate) fn new_member_failed(from: impl Into<String>, member: impl Into<String>) -> Self {
        MembershipEvent::MemberFailed(MemberChange::new(from, member))
    }

    /// The identifier of the member this event is about.
    pub fn member(&self) -> &str {
        match self {
            MembershipEvent::MemberJoined(e)
            | MembershipEvent::MemberLeft(e)
            | MembershipEvent::MemberExpired(e)
            | MembershipEvent::MemberSuspected(e)
            | MembershipEvent::MemberRecovered(e)
            | MembershipEvent::MemberFailed(e) => &e.member,
        }
    }
}
