use std::marker::PhantomData;
use std::ops::Deref;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::principal::Principal;
use super::requirement::Requirement;
use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::AuthUser;

/// Authenticated caller; 401 without a valid bearer token.
#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        Ok(Principal::resolve(auth, state.permissions.as_ref()).await)
    }
}

/// Caller that satisfied `R`. Any failed evaluation becomes the same generic
/// 403, whatever the reason.
#[derive(Debug, Clone)]
pub struct Authorized<R: Requirement> {
    pub principal: Principal,
    _requirement: PhantomData<R>,
}

impl<R: Requirement> Authorized<R> {
    pub fn into_principal(self) -> Principal {
        self.principal
    }
}

impl<R: Requirement> Deref for Authorized<R> {
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.principal
    }
}

#[async_trait]
impl<R: Requirement> FromRequestParts<AppState> for Authorized<R> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;

        if !state.policy.can(&principal, &R::requirement()).await {
            return Err(AppError::access_denied());
        }

        Ok(Self {
            principal,
            _requirement: PhantomData,
        })
    }
}
