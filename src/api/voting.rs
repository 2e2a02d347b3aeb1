use log::info;
use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::ledger::VoteLedger;
use crate::logging::RequestId;
use crate::model::api::{
    auth::{Caller, Voting},
    identity::IdentityDescription,
    vote::{VoteOutcome, VoteReceipt, VoteRequest},
};

pub fn routes() -> Vec<Route> {
    routes![me, cast_vote]
}

/// The caller's identity, including the categories they have already voted in.
#[get("/me")]
async fn me(caller: Caller<Voting>) -> Json<IdentityDescription> {
    Json(caller.identity.into())
}

#[post("/votes", data = "<vote>", format = "json")]
async fn cast_vote(
    caller: Caller<Voting>,
    vote: Json<VoteRequest>,
    ledger: &State<VoteLedger>,
    request_id: &RequestId,
) -> Result<Json<VoteReceipt>> {
    let outcome = ledger
        .cast_vote(&caller.id, vote.category_id.into(), vote.candidate_id.into())
        .await?;
    match outcome {
        VoteOutcome::Accepted(receipt) => {
            info!("req{request_id} recorded a vote in {}", receipt.category_id);
            Ok(Json(receipt))
        }
        VoteOutcome::Rejected(rejection) => Err(rejection.into()),
    }
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::error::ErrorBody;
    use crate::model::{
        api::auth::Principal,
        db::{
            candidate::{Candidate, NewCandidate},
            category::{Category, NewCategory},
        },
        mongodb::Id,
    };
    use crate::store::{MemoryStore, Store};

    use super::*;

    async fn seed(store: &MemoryStore) -> (Category, Candidate, Category, Candidate) {
        let dancer = store.insert_category(NewCategory::example()).await.unwrap();
        let a = store
            .insert_candidate(NewCandidate::example(dancer.id))
            .await
            .unwrap()
            .unwrap();
        let fashion = store.insert_category(NewCategory::example2()).await.unwrap();
        let b = store
            .insert_candidate(NewCandidate::example(fashion.id))
            .await
            .unwrap()
            .unwrap();
        (dancer, a, fashion, b)
    }

    async fn vote(
        client: &Client,
        auth: &Header<'static>,
        category_id: Id,
        candidate_id: Id,
    ) -> (Status, String) {
        let body = json!({
            "category_id": category_id.to_string(),
            "candidate_id": candidate_id.to_string(),
        });
        let response = client
            .post(uri!(cast_vote))
            .header(ContentType::JSON)
            .header(auth.clone())
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        let body = response.into_string().await.unwrap_or_default();
        (status, body)
    }

    fn reason(body: &str) -> String {
        rocket::serde::json::from_str::<ErrorBody>(body)
            .unwrap()
            .reason
    }

    #[backend_test]
    async fn token_required(client: Client) {
        let response = client.get(uri!(me)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.reason, "Unauthenticated");

        let response = client
            .get(uri!(me))
            .header(Header::new("Authorization", "Bearer not.a.token"))
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn forged_token_rejected(client: Client) {
        let token = Principal::example_voter().sign(b"wrong secret", chrono::Duration::hours(1));
        let response = client
            .get(uri!(me))
            .header(Header::new("Authorization", format!("Bearer {token}")))
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(voter)]
    async fn first_request_provisions_voter(client: Client, auth: Header<'static>) {
        let response = client.get(uri!(me)).header(auth).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let me = response.into_json::<IdentityDescription>().await.unwrap();
        assert_eq!(me.id, Principal::example_voter().id);
        assert_eq!(me.name, "Valentina Voter");
        assert!(me.voted_categories.is_empty());
    }

    #[backend_test(voter)]
    async fn vote_once_per_category(client: Client, store: MemoryStore, auth: Header<'static>) {
        let (dancer, a, fashion, b) = seed(&store).await;

        let (status, body) = vote(&client, &auth, dancer.id, a.id).await;
        assert_eq!(Status::Ok, status);
        let receipt = rocket::serde::json::from_str::<VoteReceipt>(&body).unwrap();
        assert_eq!(Id::from(receipt.candidate_id), a.id);

        let (status, body) = vote(&client, &auth, dancer.id, a.id).await;
        assert_eq!(Status::Conflict, status);
        assert_eq!(reason(&body), "AlreadyVoted");

        // Wrong category for the candidate.
        let (status, body) = vote(&client, &auth, fashion.id, a.id).await;
        assert_eq!(Status::UnprocessableEntity, status);
        assert_eq!(reason(&body), "InvalidCandidate");

        let (status, _) = vote(&client, &auth, fashion.id, b.id).await;
        assert_eq!(Status::Ok, status);

        let me = client
            .get(uri!(me))
            .header(auth)
            .dispatch()
            .await
            .into_json::<IdentityDescription>()
            .await
            .unwrap();
        assert_eq!(me.voted_categories.len(), 2);

        let tallied = store.candidate(a.id).await.unwrap().unwrap();
        assert_eq!(tallied.vote_count, 1);
    }

    #[backend_test(voter)]
    async fn closed_voting_rejects(client: Client, store: MemoryStore, auth: Header<'static>) {
        let (dancer, a, _, _) = seed(&store).await;
        store.set_voting_enabled(false).await.unwrap();

        let (status, body) = vote(&client, &auth, dancer.id, a.id).await;
        assert_eq!(Status::Forbidden, status);
        assert_eq!(reason(&body), "VotingDisabled");
        assert_eq!(store.candidate(a.id).await.unwrap().unwrap().vote_count, 0);
    }
}
