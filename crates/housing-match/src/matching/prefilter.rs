//! Coarse candidate selection run before full scoring.
//!
//! The queries only look at indexed attributes (city, country, property type,
//! and budget when no currency conversion is needed). Anything they admit is
//! still scored in full, so they may over-select but must never reject an
//! eligible pair.

use super::domain::{
    Budget, ListingStatus, Money, PropertyListing, PropertyType, TenantProfile,
};

/// Listing-side query derived from a tenant profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub cities: Vec<String>,
    pub countries: Vec<String>,
    pub property_types: Vec<PropertyType>,
    pub budget: Budget,
}

impl ListingQuery {
    pub fn for_tenant(tenant: &TenantProfile) -> Self {
        Self {
            cities: tenant.target_cities.clone(),
            countries: tenant.target_countries.clone(),
            property_types: tenant.property_types.clone(),
            budget: tenant.budget.clone(),
        }
    }

    pub fn admits(&self, listing: &PropertyListing) -> bool {
        if listing.status != ListingStatus::Active {
            return false;
        }
        let city = listing.location.city.to_lowercase();
        let country = listing.location.country.to_lowercase();
        if !self.cities.is_empty() && !self.cities.contains(&city) {
            return false;
        }
        if !self.countries.is_empty() && !self.countries.contains(&country) {
            return false;
        }
        if !self.property_types.is_empty() && !self.property_types.contains(&listing.property_type) {
            return false;
        }
        budget_admits(&self.budget, &listing.rent)
    }
}

/// Tenant-side query derived from a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantQuery {
    pub city: String,
    pub country: String,
    pub property_type: PropertyType,
    pub rent: Money,
}

impl TenantQuery {
    pub fn for_listing(listing: &PropertyListing) -> Self {
        Self {
            city: listing.location.city.to_lowercase(),
            country: listing.location.country.to_lowercase(),
            property_type: listing.property_type,
            rent: listing.rent.clone(),
        }
    }

    pub fn admits(&self, tenant: &TenantProfile) -> bool {
        if !tenant.is_active {
            return false;
        }
        if !tenant.target_cities.is_empty() && !tenant.target_cities.contains(&self.city) {
            return false;
        }
        if !tenant.target_countries.is_empty() && !tenant.target_countries.contains(&self.country) {
            return false;
        }
        if !tenant.property_types.is_empty() && !tenant.property_types.contains(&self.property_type) {
            return false;
        }
        budget_admits(&tenant.budget, &self.rent)
    }
}

/// Budget comparison is only meaningful without conversion; other currencies pass through.
fn budget_admits(budget: &Budget, rent: &Money) -> bool {
    if budget.currency != rent.currency {
        return true;
    }
    budget.contains(rent.amount as f64)
}
