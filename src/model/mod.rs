// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

pub mod builder;
pub mod types;

pub use builder::ModelBuilder;
pub use types::{ClusterModel, Job, Node, PendingJob};
