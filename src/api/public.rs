use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::ledger::VoteLedger;
use crate::model::{
    api::{
        candidate::CandidateDescription, category::CategoryDescription, stats::VotingSwitch,
    },
    mongodb::Id,
};

pub fn routes() -> Vec<Route> {
    routes![voting_status, categories, candidates]
}

#[get("/voting/status")]
async fn voting_status(ledger: &State<VoteLedger>) -> Result<Json<VotingSwitch>> {
    let enabled = ledger.voting_status().await?;
    Ok(Json(VotingSwitch { enabled }))
}

#[get("/categories")]
async fn categories(ledger: &State<VoteLedger>) -> Result<Json<Vec<CategoryDescription>>> {
    let categories = ledger.categories().await?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

#[get("/categories/<category_id>/candidates")]
async fn candidates(
    category_id: Id,
    ledger: &State<VoteLedger>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let candidates = ledger.candidates_in(category_id).await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}
