use std::sync::{Arc, Once};
use uuid::Uuid;

use crate::tickets::seed::legacy_workflow;
use crate::tickets::{
    ActorContext, AssignmentType, DirectoryUser, MemoryTicketStore, RoleSet, ServiceCategory,
    TicketStore,
};

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("Expected Ok, got Err: {:?}", err),
        }
    };
}

#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?}", val),
            Err(err) => err,
        }
    };
}

pub fn directory_user(name: &str, roles: &[&str]) -> DirectoryUser {
    DirectoryUser {
        id: Uuid::new_v4(),
        name: name.to_string(),
        roles: roles.iter().collect::<RoleSet>(),
        is_on_leave: false,
    }
}

pub fn actor(user: &DirectoryUser) -> ActorContext {
    ActorContext::new(user.id, user.roles.clone())
}

/// In-memory store holding the repair and zoom workflows plus one user per
/// role taking part in them.
pub struct Fixture {
    pub store: Arc<MemoryTicketStore>,
    pub repair: ServiceCategory,
    pub zoom: ServiceCategory,
    pub admin: DirectoryUser,
    pub teknisi: DirectoryUser,
    pub pegawai: DirectoryUser,
}

impl Fixture {
    pub fn new() -> Self {
        setup();
        let store = Arc::new(MemoryTicketStore::new());

        let admin = directory_user("Admin Layanan", &["admin_layanan"]);
        let teknisi = directory_user("Teknisi", &["teknisi"]);
        let pegawai = directory_user("Pegawai", &["pegawai"]);
        for user in [&admin, &teknisi, &pegawai] {
            crate::assert_ok!(store.add_user(user.clone()));
        }

        let mut repair = ServiceCategory::new("perbaikan", "Perbaikan", AssignmentType::Auto);
        repair.target_role = Some("teknisi".to_string());
        let mut zoom = ServiceCategory::new("zoom", "Booking Zoom", AssignmentType::None);
        zoom.target_role = Some("admin_layanan".to_string());
        crate::assert_ok!(store.add_category(repair.clone()));
        crate::assert_ok!(store.add_category(zoom.clone()));
        crate::assert_ok!(store.save_workflow(&legacy_workflow(repair.id, zoom.id)));

        Self {
            store,
            repair,
            zoom,
            admin,
            teknisi,
            pegawai,
        }
    }

    pub fn store(&self) -> Arc<dyn TicketStore> {
        self.store.clone()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
