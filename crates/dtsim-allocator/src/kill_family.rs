//! `killFamily`: writes back the exit status, releases
//! register blocks, and recycles Thread Table slots en masse.

use dtsim_network::{Network, Notification};
use dtsim_ra::{PerType, RaUnit};
use dtsim_regfile::{Producer, RegData, RegisterFile, WriteValue};
use dtsim_tables::{Fid, FamilyTable, ThreadTable};

/// Run `killFamily`'s one-shot effects. Callers must check
/// `FamilyDependencies::terminated()` and `FamilyDescriptor::kill_family_ran`
/// before calling this so it only ever runs once per family.
pub fn kill_family(
    fid: Fid,
    families: &mut FamilyTable,
    threads: &mut ThreadTable,
    ra: &mut RaUnit,
    regfile: &mut RegisterFile,
    network: &mut Network,
    tile: u32,
) {
    let fam = families.get(fid);
    let phys = fam.phys_block_size;
    let int_size = fam.integer_regs.total_registers(phys);
    let flt_size = fam.float_regs.total_registers(phys);
    ra.free(
        PerType {
            integer: fam.integer_regs.base,
            float: fam.float_regs.base,
        },
        PerType {
            integer: int_size,
            float: flt_size,
        },
    );

    let mut member = fam.member_head;
    while member != dtsim_core::NIL {
        let next = threads.get(member).member_next;
        threads.push(member);
        member = next;
    }

    let parent = fam.parent;
    let exit_code = fam.exit_code;
    let exit_value = fam.exit_value;
    let exit_code_reg = fam.exit_code_reg;
    let exit_value_reg = fam.exit_value_reg;
    let gfid = fam.gfid;

    if parent.tile == tile {
        if !exit_code_reg.is_none() {
            let _ = regfile.write(exit_code_reg, WriteValue::Full(RegData::Integer(exit_code)), Producer::Allocator);
        }
        if let Some(value) = exit_value {
            if !exit_value_reg.is_none() {
                let _ = regfile.write(
                    exit_value_reg,
                    WriteValue::Full(RegData::Integer(value)),
                    Producer::Allocator,
                );
            }
        }
    } else if let Some(gfid) = gfid {
        network.notifications.try_inject(tile, Notification::FamilyCompletion(gfid));
    }

    let fam = families.get_mut(fid);
    fam.member_head = dtsim_core::NIL;
    fam.kill_family_ran = true;
}
