pub mod audit;
pub mod mfa;
pub mod principals;
pub mod rbac;
pub mod system;
