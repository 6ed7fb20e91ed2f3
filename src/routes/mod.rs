/// Router Module Index
///
/// One router per trust level. The access rule for each group is applied as a
/// layer in `create_router`, so a route cannot end up less protected than the
/// module it is declared in. The full table lives in `authz::ROUTE_POLICIES`.

/// Routes accessible without any credential.
/// Handlers that can reveal hidden posts still check the optional viewer.
pub mod public;

/// Routes requiring a valid `user_token` session.
pub mod authenticated;

/// Routes requiring a valid `admin_token` session.
pub mod admin;
