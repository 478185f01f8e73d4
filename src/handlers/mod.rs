// Handlers by security tier:
// public (no auth) -> protected (JWT + active user) -> elevated (super admin)
pub mod elevated;
pub mod protected;
pub mod public;
