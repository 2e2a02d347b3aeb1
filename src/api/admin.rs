use std::collections::BTreeMap;

use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::ledger::VoteLedger;
use crate::model::{
    api::{
        auth::{Administration, Caller},
        candidate::{CandidateDescription, CandidateSpec},
        category::{CategoryDescription, CategorySpec},
        id::ApiId,
        stats::{CategoryStanding, SummaryStats, TallyAudit, VotingSwitch},
    },
    mongodb::Id,
};

type Admin = Caller<Administration>;

pub fn routes() -> Vec<Route> {
    routes![
        set_voting_status,
        create_category,
        modify_category,
        delete_category,
        search_candidates,
        create_candidate,
        modify_candidate,
        delete_candidate,
        standings,
        stats,
        audit,
    ]
}

#[put("/admin/voting/status", data = "<switch>", format = "json")]
async fn set_voting_status(
    _admin: Admin,
    switch: Json<VotingSwitch>,
    ledger: &State<VoteLedger>,
) -> Result<Json<VotingSwitch>> {
    ledger.set_voting_status(switch.enabled).await?;
    Ok(switch)
}

#[post("/admin/categories", data = "<spec>", format = "json")]
async fn create_category(
    _admin: Admin,
    spec: Json<CategorySpec>,
    ledger: &State<VoteLedger>,
) -> Result<Json<CategoryDescription>> {
    let category = ledger.create_category(spec.0).await?;
    Ok(Json(category.into()))
}

#[put("/admin/categories/<category_id>", data = "<spec>", format = "json")]
async fn modify_category(
    _admin: Admin,
    category_id: Id,
    spec: Json<CategorySpec>,
    ledger: &State<VoteLedger>,
) -> Result<Json<CategoryDescription>> {
    let category = ledger.update_category(category_id, spec.0).await?;
    Ok(Json(category.into()))
}

#[delete("/admin/categories/<category_id>")]
async fn delete_category(
    _admin: Admin,
    category_id: Id,
    ledger: &State<VoteLedger>,
) -> Result<()> {
    ledger.delete_category(category_id).await
}

#[get("/admin/candidates?<search>")]
async fn search_candidates(
    _admin: Admin,
    search: Option<&str>,
    ledger: &State<VoteLedger>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let candidates = ledger.search_candidates(search).await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

#[post("/admin/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    _admin: Admin,
    spec: Json<CandidateSpec>,
    ledger: &State<VoteLedger>,
) -> Result<Json<CandidateDescription>> {
    let candidate = ledger.create_candidate(spec.0).await?;
    Ok(Json(candidate.into()))
}

#[put("/admin/candidates/<candidate_id>", data = "<spec>", format = "json")]
async fn modify_candidate(
    _admin: Admin,
    candidate_id: Id,
    spec: Json<CandidateSpec>,
    ledger: &State<VoteLedger>,
) -> Result<Json<CandidateDescription>> {
    let candidate = ledger.update_candidate(candidate_id, spec.0).await?;
    Ok(Json(candidate.into()))
}

#[delete("/admin/candidates/<candidate_id>")]
async fn delete_candidate(
    _admin: Admin,
    candidate_id: Id,
    ledger: &State<VoteLedger>,
) -> Result<()> {
    ledger.delete_candidate(candidate_id).await
}

/// The leading candidates of every category, keyed by category ID.
#[get("/admin/standings?<n>")]
async fn standings(
    _admin: Admin,
    n: Option<usize>,
    ledger: &State<VoteLedger>,
) -> Result<Json<BTreeMap<ApiId, CategoryStanding>>> {
    Ok(Json(ledger.top_candidates(n).await?))
}

#[get("/admin/stats")]
async fn stats(_admin: Admin, ledger: &State<VoteLedger>) -> Result<Json<SummaryStats>> {
    Ok(Json(ledger.summary_stats().await?))
}

#[get("/admin/audit")]
async fn audit(_admin: Admin, ledger: &State<VoteLedger>) -> Result<Json<TallyAudit>> {
    Ok(Json(ledger.audit_tally().await?))
}
