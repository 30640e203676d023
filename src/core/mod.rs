// ─── Skinweave Core ───
// Local skin overlay pipeline for League of Legends.
//
// Architecture:
//   core/
//     game/        Installation discovery (cache, manifest, volumes, process, registry)
//     skins/       Name directory cache, asset download cache, safe extraction
//     overlay/     External overlay tool: job phases, build, detached run
//     client/      Running client liaison (credentials, restart)
//     updater/     Release check, staged download, atomic core swap
//     setup/       Tool set, plugin and loader installation
//     pipeline     The "apply mod" action end to end
//     downloader/  Streamed HTTP downloads
//     process/     OS process table and detached spawning
//     state/       Settings store and application wiring

pub mod client;
pub mod downloader;
pub mod error;
pub mod game;
pub mod http;
pub mod overlay;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod setup;
pub mod skins;
pub mod state;
pub mod updater;
