//! Movie catalog handlers.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::{ApiError, ApiResult, JsonBody};
use super::middleware::CurrentIdentity;
use super::state::AppState;
use crate::catalog::{Filters, MovieFields, MovieQuery, Runtime, MOVIE_SORT_SAFELIST};
use crate::concurrency;
use crate::validation::Validator;

/// Clients may pin the version they last read with this header.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateMovieRequest {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

pub async fn create_movie(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    JsonBody(input): JsonBody<CreateMovieRequest>,
) -> ApiResult<impl IntoResponse> {
    let fields = MovieFields {
        title: input.title,
        year: input.year,
        runtime: input.runtime,
        genres: input.genres,
    };

    let mut v = Validator::new();
    fields.validate(&mut v);
    if !v.is_valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let movie = state.store.insert_movie(fields).await?;
    info!(
        movie_id = movie.id,
        user_id = identity.user().map(|u| u.id),
        "Created movie"
    );

    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
        .map_err(ApiError::internal)?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    ))
}

pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let movie = state.store.get_movie(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<UpdateMovieRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let mut movie = state.store.get_movie(id).await?.ok_or(ApiError::NotFound)?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        let expected = expected
            .to_str()
            .map_err(|_| ApiError::BadRequest("invalid X-Expected-Version header".to_string()))?;
        if expected != movie.version.to_string() {
            return Err(ApiError::EditConflict);
        }
    }

    let mut fields = movie.fields();
    if let Some(title) = input.title {
        fields.title = title;
    }
    if let Some(year) = input.year {
        fields.year = year;
    }
    if let Some(runtime) = input.runtime {
        fields.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        fields.genres = genres;
    }

    let mut v = Validator::new();
    fields.validate(&mut v);
    if !v.is_valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let version = concurrency::commit(state.store.as_ref(), id, movie.version, fields.clone()).await?;
    movie.apply(fields);
    movie.version = version;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    if !state.store.delete_movie(id).await? {
        return Err(ApiError::NotFound);
    }
    info!(
        movie_id = id,
        user_id = identity.user().map(|u| u.id),
        "Deleted movie"
    );
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let mut v = Validator::new();
    let query = parse_list_query(&params, &mut v);
    query.filters.validate(&mut v);
    if !v.is_valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let (movies, metadata) = state.store.list_movies(&query).await?;
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

fn parse_list_query(params: &HashMap<String, String>, v: &mut Validator) -> MovieQuery {
    let mut filters = Filters::new(MOVIE_SORT_SAFELIST);
    filters.page = read_int(params, "page", filters.page, v);
    filters.page_size = read_int(params, "page_size", filters.page_size, v);
    if let Some(sort) = params.get("sort") {
        filters.sort = sort.clone();
    }

    let genres = params
        .get("genres")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    MovieQuery {
        title: params.get("title").cloned().unwrap_or_default(),
        genres,
        filters,
    }
}

fn read_int(params: &HashMap<String, String>, key: &str, default: u64, v: &mut Validator) -> u64 {
    match params.get(key) {
        None => default,
        Some(raw) => match raw.parse::<i64>() {
            // Negative values fall through to the range checks as zero
            Ok(n) => u64::try_from(n).unwrap_or(0),
            Err(_) => {
                v.add_error(key, "must be an integer value");
                default
            }
        },
    }
}

fn parse_id(raw: &str) -> ApiResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_list_query_defaults() {
        let mut v = Validator::new();
        let query = parse_list_query(&HashMap::new(), &mut v);
        assert!(v.is_valid());
        assert_eq!(query.filters.page, 1);
        assert_eq!(query.filters.page_size, 20);
        assert_eq!(query.filters.sort, "id");
        assert!(query.title.is_empty());
        assert!(query.genres.is_empty());
    }

    #[test]
    fn test_parse_list_query_values() {
        let mut v = Validator::new();
        let query = parse_list_query(
            &params(&[
                ("title", "moana"),
                ("genres", "animation, adventure"),
                ("page", "2"),
                ("page_size", "5"),
                ("sort", "-year"),
            ]),
            &mut v,
        );
        assert!(v.is_valid());
        assert_eq!(query.title, "moana");
        assert_eq!(query.genres, ["animation", "adventure"]);
        assert_eq!(query.filters.page, 2);
        assert_eq!(query.filters.page_size, 5);
        assert_eq!(query.filters.sort, "-year");
    }

    #[test]
    fn test_parse_list_query_rejects_non_integers() {
        let mut v = Validator::new();
        parse_list_query(&params(&[("page", "abc")]), &mut v);
        assert_eq!(v.errors()["page"], "must be an integer value");
    }

    #[test]
    fn test_negative_page_fails_range_check() {
        let mut v = Validator::new();
        let query = parse_list_query(&params(&[("page", "-1")]), &mut v);
        query.filters.validate(&mut v);
        assert_eq!(v.errors()["page"], "must be greater than zero");
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12"), Ok(12));
        assert_eq!(parse_id("0"), Err(ApiError::NotFound));
        assert_eq!(parse_id("-3"), Err(ApiError::NotFound));
        assert_eq!(parse_id("abc"), Err(ApiError::NotFound));
    }
}
