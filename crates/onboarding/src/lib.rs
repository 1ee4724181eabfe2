//! `clienthub-onboarding` — client application onboarding domain.
//!
//! A client application asks for access to the platform's products, is
//! accepted on creation, then activated, rejected, or has its creation
//! revoked. Terminal states are statuses; an application is never deleted.

pub mod application;

pub use application::{
    ActivateClientApplication, ApplicationStatus, ChangeProductAccess, ClientApplication,
    ClientApplicationActivated, ClientApplicationCommand, ClientApplicationCreated,
    ClientApplicationCreationRevoked, ClientApplicationEvent, ClientApplicationId,
    ClientApplicationRejected, CreateClientApplication, GrantProductAccess, ProductAccess,
    ProductAccessChanged, ProductAccessGranted, RejectClientApplicationCreation,
    RevokeClientApplicationCreation,
};
