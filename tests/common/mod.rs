pub(crate) mod logging;

pub(crate) mod mem_db;

pub(crate) mod network;

pub(crate) mod chain_factory;

pub(crate) mod dk_share;

pub(crate) mod collaborators;

pub(crate) mod test_context;
