use crate::calendar::DateRange;
use crate::reservation::BookingError;
use rentchain_sdk::objects::{PropertySnapshot, PropertyStatus, Wei};
use rust_decimal::Decimal;

/// Price of a stay, computed from the property snapshot only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayPrice {
    pub nights: u32,
    pub total_price: Decimal,
    pub security_deposit: Decimal,
}

impl StayPrice {
    /// What the escrow deposit must carry: stay plus security deposit, in wei.
    pub fn expected_deposit(&self) -> Option<Wei> {
        expected_deposit(self.total_price, self.security_deposit)
    }
}

pub fn expected_deposit(total_price: Decimal, security_deposit: Decimal) -> Option<Wei> {
    Wei::from_ether(total_price.checked_add(security_deposit)?)
}

/// Check that `property` accepts this stay and price it.
pub fn price_stay(
    property: &PropertySnapshot,
    range: DateRange,
    guests: Option<u32>,
) -> Result<StayPrice, BookingError> {
    if property.status != PropertyStatus::Active {
        return Err(BookingError::Validation(format!(
            "property {} is not available for booking",
            property.property_id
        )));
    }
    if property
        .owner_wallet
        .as_deref()
        .is_none_or(|w| w.trim().is_empty())
    {
        return Err(BookingError::Validation(format!(
            "owner of property {} has no payout wallet",
            property.property_id
        )));
    }
    if let (Some(guests), Some(max)) = (guests, property.max_guests)
        && guests > max
    {
        return Err(BookingError::Validation(format!(
            "{guests} guests exceed the maximum of {max}"
        )));
    }
    if guests == Some(0) {
        return Err(BookingError::Validation("at least one guest is required".into()));
    }

    let nights = range.nights();
    if nights == 0 {
        return Err(BookingError::Validation("stay must be at least one night".into()));
    }
    if nights < property.min_stay_nights {
        return Err(BookingError::Validation(format!(
            "minimum stay is {} nights",
            property.min_stay_nights
        )));
    }

    let total_price = property
        .price_per_night
        .checked_mul(Decimal::from(nights))
        .ok_or_else(|| BookingError::Validation("price overflow".into()))?;
    Ok(StayPrice {
        nights,
        total_price,
        security_deposit: property.security_deposit,
    })
}
