use crate::common::virtual_network::VirtualSystem;

pub fn vnet_simple_weighted() -> VirtualSystem {
    VirtualSystem::create(
        &["1", "2", "3", "4", "5"],
        &[
            (0, "1", "2", 200),
            (1, "1", "3", 100),
            (2, "2", "3", 400),
            (3, "2", "4", 500),
            (4, "3", "4", 10000),
            (5, "3", "5", 800),
            (6, "4", "5", 100),
        ],
    )
}

/// 1 - 2 - 3 - 4 - 5
pub fn vnet_line() -> VirtualSystem {
    VirtualSystem::create(
        &["1", "2", "3", "4", "5"],
        &[
            (0, "1", "2", 100),
            (1, "2", "3", 100),
            (2, "3", "4", 100),
            (3, "4", "5", 100),
        ],
    )
}

/// 1 reaches 4 over 2 or 3
pub fn vnet_diamond() -> VirtualSystem {
    VirtualSystem::create(
        &["1", "2", "3", "4"],
        &[
            (0, "1", "2", 100),
            (1, "1", "3", 100),
            (2, "2", "4", 100),
            (3, "3", "4", 100),
        ],
    )
}
