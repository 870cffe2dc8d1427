//! Flight search prompt sent to Gemini

use crate::SearchParams;

/// Renders the search prompt for `params`.
///
/// The model is asked for a bare JSON array; the shape below is what
/// [`crate::Flight`] deserializes.
pub fn build_prompt(params: &SearchParams) -> String {
    let return_date = params.return_leg().unwrap_or("One-way trip");

    format!(
        r#"
    You are a flight search API. Your task is to find and return real, bookable flight options based on the following criteria using your search capabilities.
    - Origin: {origin}
    - Destination: {destination}
    - Departure Date: {departure_date}
    - Return Date: {return_date}
    - Passengers: {adults} adult(s), {children} child(ren)

    Instructions:
    1.  Use your search tool to find real flight information for the specified route and dates.
    2.  Generate a list of 5 to 7 flight options.
    3.  For each flight, provide the airline, flight number, two-letter IATA carrier code, departure/arrival airports and times, departure date, total duration, number of stops, and an estimated price in USD.
    4.  CRITICAL: For each flight, you MUST also provide a 'bookingUrl'. This must be a real, working URL found directly in your search results that corresponds to the specific flight. Do not invent, guess, or fabricate a URL from a template. The link must lead the user to a page where they can see and book the exact flight you have listed. Prioritize the airline's official website, but a direct link to the itinerary on a major booking site like Google Flights is also acceptable if a direct airline link is not found.
    5.  Ensure the origin and destination cities and codes match the user's request.
    6.  VERY IMPORTANT: Respond ONLY with a valid JSON array of flight objects. Do not include markdown formatting, any introductory text, titles, or explanations. The entire response must be the JSON data itself.

    The JSON objects in the array must have the following structure:
    {{
      "id": "a-unique-identifier",
      "airline": "Airline Name",
      "flightNumber": "FL123",
      "carrierCode": "FL",
      "origin": {{ "code": "SFO", "city": "San Francisco", "time": "08:30" }},
      "destination": {{ "code": "NRT", "city": "Tokyo", "time": "11:45" }},
      "departureDate": "{departure_date}",
      "duration": "11h 15m",
      "stops": 0,
      "price": 1234.56,
      "bookingUrl": "https://www.google.com/flights#flt=SFO.NRT.2024-10-26..."
    }}
  "#,
        origin = params.origin.trim(),
        destination = params.destination.trim(),
        departure_date = params.departure_date.trim(),
        return_date = return_date,
        adults = params.adults,
        children = params.children,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TripType;

    #[test]
    fn test_one_way_prompt() {
        let params = SearchParams::new("San Francisco", "Tokyo", "2025-10-26");
        let prompt = build_prompt(&params);

        assert!(prompt.contains("- Origin: San Francisco"));
        assert!(prompt.contains("- Destination: Tokyo"));
        assert!(prompt.contains("- Departure Date: 2025-10-26"));
        assert!(prompt.contains("- Return Date: One-way trip"));
        assert!(prompt.contains("- Passengers: 1 adult(s), 0 child(ren)"));
        assert!(prompt.contains("\"departureDate\": \"2025-10-26\""));
        assert!(prompt.contains("\"carrierCode\""));
    }

    #[test]
    fn test_round_trip_prompt() {
        let mut params = SearchParams::new("RUH", "JED", "2025-03-01");
        params.trip_type = TripType::RoundTrip;
        params.return_date = Some("2025-03-08".to_string());
        params.adults = 2;
        params.children = 1;

        let prompt = build_prompt(&params);
        assert!(prompt.contains("- Return Date: 2025-03-08"));
        assert!(prompt.contains("- Passengers: 2 adult(s), 1 child(ren)"));
    }
}
