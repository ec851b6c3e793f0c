//! Serve command implementation.

use tracing::info;
use worldsync_core::{AgentId, Identity, SyncGroupRole};
use worldsync_server::{ServerConfig, WorldServer};

/// Runs the server until Ctrl-C.
pub fn run(config: ServerConfig, dev_agent: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let server = WorldServer::new(config)?;
        if dev_agent {
            let token = issue_dev_credential(&server)?;
            println!("{token}");
        }
        info!(
            groups = server.world().sync_groups().len(),
            "starting world server"
        );
        server.run().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Creates an agent with full rights in every sync group and returns a
/// freshly issued credential for it.
fn issue_dev_credential(server: &WorldServer) -> Result<String, Box<dyn std::error::Error>> {
    let agent = AgentId::new();
    let world = server.world();
    for group in world.sync_groups().all() {
        world
            .permissions()
            .set_role(&Identity::System, SyncGroupRole::full(agent, group.name))?;
    }
    let issued = server.issuer().issue(agent)?;
    info!(%agent, session_id = %issued.session.session_id, "issued development credential");
    Ok(issued.token)
}
