use axum::{extract::Request, middleware::Next, response::Response};

use crate::{
    app_error::AppError,
    auth::{CurrentUser, Role},
};

async fn authorize(mut req: Request, next: Next, allowed: &[Role]) -> Result<Response, AppError> {
    let user = CurrentUser::from_headers(req.headers())?;
    if !allowed.contains(&user.role) {
        return Err(AppError::ForbiddenResource(
            "Role is not allowed to access this resource".into(),
        ));
    }
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Any authenticated caller.
pub async fn authorization(req: Request, next: Next) -> Result<Response, AppError> {
    authorize(req, next, &[Role::Customer, Role::ShopOwner, Role::Admin]).await
}

pub async fn customers_authorization(req: Request, next: Next) -> Result<Response, AppError> {
    authorize(req, next, &[Role::Customer]).await
}

pub async fn shop_owners_authorization(req: Request, next: Next) -> Result<Response, AppError> {
    authorize(req, next, &[Role::ShopOwner]).await
}

pub async fn admins_authorization(req: Request, next: Next) -> Result<Response, AppError> {
    authorize(req, next, &[Role::Admin]).await
}
