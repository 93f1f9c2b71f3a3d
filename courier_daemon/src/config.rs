#[derive(Clone, Default)]
pub struct DaemonConfig {
    pub custom_port: Option<u16>,
}
