/*!
# Legion DevKit - Outils de test pour le relais

Bibliothèque facilitant l'écriture de tests bout-en-bout du relais avec:
- Un relais complet servi en process sur un port éphémère
- Des robots / clients WebSocket simulés
- Des builders de payloads (frames JPEG factices, commandes, télémétrie)
*/

pub mod builders;
pub mod harness;
pub mod ws_peer;

pub use builders::PayloadBuilder;
pub use harness::TestHarness;
pub use ws_peer::WsPeer;
