/*!
# ESXi DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le test du dashboard sans orchestrateur réel:
- Stub HTTP de l'API orchestrateur (Axum, port éphémère)
- Enregistrement des requêtes pour assertions
- Fixtures JSON (hosts, jobs, patches)
*/

pub mod fixtures;
pub mod stub_api;

pub use stub_api::{RecordedRequest, ReceivedUpload, StubOrchestrator};
pub use axum::http::Method;
