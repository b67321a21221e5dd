//! Near/far address encoding.
//!
//! Descriptor addresses with the high bit clear are indices into the local
//! section ("near"). With the high bit set the low 31 bits index the link
//! table ("far").

pub const INVALID_ADDRESS_U32: u32 = 0xFFFF_FFFF;
pub const INVALID_OFFSET_U16: u16 = 0xFFFF;

const FAR_BIT: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Near,
    Far,
    Invalid,
}

#[inline]
pub fn is_near(address: u32) -> bool {
    address >> 31 == 0
}

#[inline]
pub fn is_far(address: u32) -> bool {
    address != INVALID_ADDRESS_U32 && address >> 31 == 1
}

#[inline]
pub fn is_valid(address: u32) -> bool {
    address != INVALID_ADDRESS_U32
}

pub fn address_type(address: u32) -> AddressType {
    if !is_valid(address) {
        AddressType::Invalid
    } else if is_near(address) {
        AddressType::Near
    } else {
        AddressType::Far
    }
}

#[inline]
pub fn link_offset(address: u32) -> u32 {
    address & !FAR_BIT
}

#[inline]
pub fn link_address(offset: u32) -> u32 {
    offset | FAR_BIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_and_far() {
        assert_eq!(address_type(3), AddressType::Near);
        let far = link_address(3);
        assert_eq!(address_type(far), AddressType::Far);
        assert_eq!(link_offset(far), 3);
        assert_eq!(address_type(INVALID_ADDRESS_U32), AddressType::Invalid);
        assert!(!is_far(INVALID_ADDRESS_U32));
    }
}
