// Elevated handlers (/api/root/*): super admins only
pub mod sites;
