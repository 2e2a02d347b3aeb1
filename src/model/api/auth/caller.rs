use std::marker::PhantomData;
use std::ops::Deref;

use rocket::{
    outcome::try_outcome,
    request::{FromRequest, Outcome},
    Request, State,
};

use crate::error::Error;
use crate::ledger::VoteLedger;
use crate::model::{
    common::role::Operation,
    db::identity::Identity,
};

use super::Principal;

/// A capability a route demands of its caller.
pub trait Capability: Send + Sync + 'static {
    /// The operation whose allowed-role set the caller's role must be in.
    const OPERATION: Operation;
}

/// May cast votes and read their own voting record.
pub struct Voting;

impl Capability for Voting {
    const OPERATION: Operation = Operation::CastVote;
}

/// May administer the event.
pub struct Administration;

impl Capability for Administration {
    const OPERATION: Operation = Operation::Administer;
}

/// An authenticated caller whose stored role grants capability `C`.
///
/// Resolving this guard provisions the caller's identity document on first use.
pub struct Caller<C> {
    pub identity: Identity,
    phantom: PhantomData<fn() -> C>,
}

impl<C> Deref for Caller<C> {
    type Target = Identity;

    fn deref(&self) -> &Self::Target {
        &self.identity
    }
}

#[rocket::async_trait]
impl<'r, C> FromRequest<'r> for Caller<C>
where
    C: Capability,
{
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let principal = try_outcome!(req.guard::<Principal>().await);

        // Unwrap is safe as the ledger is always managed.
        let ledger = req.guard::<&State<VoteLedger>>().await.unwrap();
        let identity = match ledger.provision_identity(&principal).await {
            Ok(identity) => identity,
            Err(err) => return err.fail_guard(req),
        };

        if !identity.role.permits(C::OPERATION) {
            return Error::Forbidden(format!(
                "role {} may not perform {:?}",
                identity.role,
                C::OPERATION
            ))
            .fail_guard(req);
        }

        Outcome::Success(Self {
            identity,
            phantom: PhantomData,
        })
    }
}
